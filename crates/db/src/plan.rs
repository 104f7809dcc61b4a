use std::collections::HashMap;

use serde_json::Value;

use crate::models::{PlanQuestion, PlanQuestionOption, PlanResult};

/// Extract the first `{...}` object embedded in free-form agent output and
/// shape it into a `PlanResult`. The scanner is a naive brace-depth counter,
/// not quote-aware: a `{` or `}` inside a JSON string value will throw off
/// the depth count for that starting position, so scanning continues past
/// the failed parse rather than giving up on it. This is intentional
/// leniency, not a bug to fix.
pub fn parse_plan(text: &str) -> PlanResult {
    match find_first_json_object(text) {
        Some(obj) => plan_from_object(&obj, text),
        None => PlanResult {
            raw_text: text.to_string(),
            valid_json: false,
            ..Default::default()
        },
    }
}

fn find_first_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let chars: Vec<char> = text.chars().collect();
    for start in 0..chars.len() {
        if chars[start] != '{' {
            continue;
        }
        let mut depth: i32 = 0;
        for (offset, &ch) in chars[start..].iter().enumerate() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + offset;
                        let candidate: String = chars[start..=end].iter().collect();
                        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
                            return Some(map);
                        }
                        continue;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn coerce_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn coerce_list(v: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .map(coerce_scalar)
        .filter(|s| !s.is_empty())
        .collect()
}

fn plan_from_object(obj: &serde_json::Map<String, Value>, raw_text: &str) -> PlanResult {
    let summary = obj.get("summary").map(coerce_scalar).unwrap_or_default();
    let recommended_prompt = obj.get("recommended_prompt").map(coerce_scalar).unwrap_or_default();
    let validation = obj.get("validation").map(coerce_scalar).unwrap_or_default();
    let rollback = obj.get("rollback").map(coerce_scalar).unwrap_or_default();
    let estimated_time = obj.get("estimated_time").map(coerce_scalar).unwrap_or_default();

    let questions = obj
        .get("questions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(idx, q)| q.as_object().map(|qo| question_from_object(qo, idx)))
                .collect()
        })
        .unwrap_or_default();

    PlanResult {
        summary,
        questions,
        recommended_prompt,
        raw_text: raw_text.to_string(),
        valid_json: true,
        steps: coerce_list(obj.get("steps")),
        risks: coerce_list(obj.get("risks")),
        validation,
        rollback,
        affected_files: coerce_list(obj.get("affected_files")),
        new_dependencies: coerce_list(obj.get("new_dependencies")),
        estimated_time,
    }
}

fn question_from_object(obj: &serde_json::Map<String, Value>, idx: usize) -> PlanQuestion {
    let default_id = format!("q{}", idx + 1);
    let id = obj
        .get("id")
        .map(coerce_scalar)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_id);
    let title = obj
        .get("title")
        .map(coerce_scalar)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| id.clone());
    let question = obj.get("question").map(coerce_scalar).unwrap_or_default();
    let recommended_option_key = obj
        .get("recommended_option_key")
        .map(coerce_scalar)
        .filter(|s| !s.is_empty());

    let options = obj
        .get("options")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(oidx, o)| o.as_object().map(|oo| option_from_object(oo, oidx)))
                .collect()
        })
        .unwrap_or_default();

    PlanQuestion { id, title, question, options, recommended_option_key }
}

fn option_from_object(obj: &serde_json::Map<String, Value>, idx: usize) -> PlanQuestionOption {
    let default_key = format!("o{}", idx + 1);
    let key = obj
        .get("key")
        .map(coerce_scalar)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_key);
    let label = obj
        .get("label")
        .map(coerce_scalar)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| key.clone());
    let description = obj.get("description").map(coerce_scalar).unwrap_or_default();
    PlanQuestionOption { key, label, description }
}

/// Fixed instruction the agent receives in PLAN mode: ask for a JSON plan
/// object with a specific schema, embedding the user's original prompt.
pub fn plan_prompt(task_prompt: &str) -> String {
    format!(
        "你现在在 Plan 模式。\n\
         请先分析用户需求，再返回一个 JSON 对象（必须可解析），字段严格包含：{{\"summary\": \"执行前计划摘要\", \"questions\": [{{\"id\": \"q1\", \"title\": \"决策项标题\", \"question\": \"你要确认的关键问题\", \"options\": [{{\"key\": \"a\", \"label\": \"选项A\", \"description\": \"影响\"}}, {{\"key\": \"b\", \"label\": \"选项B\", \"description\": \"影响\"}}], \"recommended_option_key\": \"a\"}}], \"recommended_prompt\": \"建议进入执行模式时使用的最终 Prompt\"}}\n\
         JSON 后面可以追加简短说明。\n\
         用户需求如下：\n\
         {task_prompt}"
    )
}

/// Build the follow-up EXEC prompt once a plan has been confirmed: a summary
/// of the plan, the user's per-question answers, the agent's suggested
/// execution prompt (if any), and the original requirement.
pub fn build_exec_prompt(original: &str, plan: &PlanResult, answers: &HashMap<String, String>) -> String {
    let mut sections = vec!["以下是已确认的执行上下文：".to_string()];

    if !plan.summary.is_empty() {
        sections.push(format!("计划摘要\n{}", plan.summary));
    }

    if !answers.is_empty() {
        let mut keys: Vec<&String> = answers.keys().collect();
        keys.sort();
        let lines: Vec<String> = keys.iter().map(|k| format!("{k}: {}", answers[*k])).collect();
        sections.push(format!("用户确认\n{}", lines.join("\n")));
    }

    if !plan.recommended_prompt.is_empty() {
        sections.push(format!("建议执行 Prompt\n{}", plan.recommended_prompt));
    }

    sections.push(format!("原始需求\n{original}"));

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_extracts_first_balanced_object() {
        let text = r#"blah blah {"summary":"s","questions":[{"id":"q1","title":"t","question":"?","options":[{"key":"a","label":"A"}],"recommended_option_key":"a"}],"recommended_prompt":"rp"} trailing notes"#;
        let plan = parse_plan(text);
        assert!(plan.valid_json);
        assert_eq!(plan.summary, "s");
        assert_eq!(plan.questions.len(), 1);
        assert_eq!(plan.questions[0].id, "q1");
        assert_eq!(plan.questions[0].options[0].key, "a");
        assert_eq!(plan.recommended_prompt, "rp");
    }

    #[test]
    fn parse_plan_falls_back_when_nothing_parses() {
        let plan = parse_plan("not json at all");
        assert!(!plan.valid_json);
        assert_eq!(plan.raw_text, "not json at all");
    }

    #[test]
    fn parse_plan_defaults_ids_and_labels() {
        let text = r#"{"questions":[{"question":"?","options":[{"label":"only label"}]}]}"#;
        let plan = parse_plan(text);
        assert_eq!(plan.questions[0].id, "q1");
        assert_eq!(plan.questions[0].title, "q1");
        assert_eq!(plan.questions[0].options[0].key, "o1");
    }

    #[test]
    fn build_exec_prompt_includes_all_sections() {
        let plan = PlanResult {
            summary: "do the thing".to_string(),
            recommended_prompt: "go do it".to_string(),
            ..Default::default()
        };
        let mut answers = HashMap::new();
        answers.insert("q1".to_string(), "a".to_string());
        let prompt = build_exec_prompt("original ask", &plan, &answers);
        assert!(prompt.contains("计划摘要"));
        assert!(prompt.contains("do the thing"));
        assert!(prompt.contains("用户确认"));
        assert!(prompt.contains("q1: a"));
        assert!(prompt.contains("建议执行 Prompt"));
        assert!(prompt.contains("原始需求"));
        assert!(prompt.contains("original ask"));
    }
}
