//! Turning raw model text into an answer plus steps.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use super::{Generation, Step};

const ANSWER_PREFIX: &str = "Answer:";
const NO_ANSWER: &str = "Please see the steps above for the complete solution.";

const LATEX_REPLACEMENTS: [(&str, &str); 24] = [
    (r"\cdot", "·"),
    (r"\times", "×"),
    (r"\leq", "≤"),
    (r"\geq", "≥"),
    (r"\neq", "≠"),
    (r"\pm", "±"),
    (r"\approx", "≈"),
    (r"\infty", "∞"),
    (r"\Rightarrow", "⇒"),
    (r"\to", "→"),
    (r"\sin", "sin"),
    (r"\cos", "cos"),
    (r"\tan", "tan"),
    (r"\ln", "ln"),
    (r"\log", "log"),
    (r"\lim", "lim"),
    (r"\sqrt", "√"),
    (r"\pi", "π"),
    (r"\theta", "θ"),
    (r"\alpha", "α"),
    (r"\beta", "β"),
    (r"\gamma", "γ"),
    (r"\Delta", "Δ"),
    (r"\mathbb{R}", "ℝ"),
];

#[derive(Debug, Deserialize)]
struct StructuredSolution {
    #[serde(default)]
    final_answer: String,
    #[serde(default)]
    steps: Vec<StructuredStep>,
}

#[derive(Debug, Deserialize)]
struct StructuredStep {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "content")]
    explanation: String,
    #[serde(default)]
    expression: Option<String>,
}

fn frac_regex() -> &'static Regex {
    static FRAC: OnceLock<Regex> = OnceLock::new();
    FRAC.get_or_init(|| Regex::new(r"\\frac\{([^}]+)\}\{([^}]+)\}").expect("frac pattern"))
}

fn sizing_regex() -> &'static Regex {
    static SIZING: OnceLock<Regex> = OnceLock::new();
    SIZING.get_or_init(|| Regex::new(r"\\(left|right|big|Big|quad|qquad)").expect("sizing pattern"))
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("header pattern"))
}

fn numbered_regex() -> &'static Regex {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    NUMBERED.get_or_init(|| {
        Regex::new(r"(?i)^(?:step\s*)?\d+\s*[.):]\s*(.*)$").expect("numbered pattern")
    })
}

/// Rewrites LaTeX-flavoured math into plain unicode text. Line breaks are
/// kept.
pub fn normalize_math(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = text
        .replace("$$", "")
        .replace('$', "")
        .replace("\\[", "")
        .replace("\\]", "")
        .replace("\\(", "")
        .replace("\\)", "")
        .replace("**", "")
        .replace('`', "");
    out = header_regex().replace_all(&out, "").into_owned();
    out = sizing_regex().replace_all(&out, "").into_owned();
    out = frac_regex().replace_all(&out, "($1)/($2)").into_owned();
    for (latex, plain) in LATEX_REPLACEMENTS {
        out = out.replace(latex, plain);
    }
    out = out.replace("^2", "²").replace("^3", "³");

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parses model output into a [`Generation`].
///
/// JSON (optionally fenced) with `final_answer` and `steps` is preferred;
/// anything else goes through a line-oriented step parser.
pub fn parse_generation(raw: &str) -> Generation {
    let raw = raw.trim();
    let generation = match parse_json(raw) {
        Some(solution) => from_structured(solution),
        None => parse_plain(&normalize_math(raw)),
    };
    finish(generation)
}

fn parse_json(raw: &str) -> Option<StructuredSolution> {
    let body = raw
        .strip_prefix("```json")
        .or_else(|| raw.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(raw)
        .trim();
    if !body.starts_with('{') {
        return None;
    }
    serde_json::from_str(body).ok()
}

fn from_structured(solution: StructuredSolution) -> Generation {
    let steps = solution
        .steps
        .into_iter()
        .enumerate()
        .map(|(idx, step)| Step {
            title: if step.title.trim().is_empty() {
                format!("Step {}", idx + 1)
            } else {
                step.title.trim().to_string()
            },
            content: normalize_math(&step.explanation),
            expression: step
                .expression
                .map(|e| normalize_math(&e))
                .filter(|e| !e.is_empty()),
        })
        .collect();
    Generation {
        answer: normalize_math(&solution.final_answer),
        steps,
    }
}

fn is_conclusion(lower: &str) -> bool {
    ["therefore", "thus", "finally", "hence", "answer:", "the answer is", "final answer"]
        .iter()
        .any(|w| lower.contains(w))
}

fn is_expression(line: &str) -> bool {
    line.contains('=') || line.chars().any(|c| "+*/^√∫∑∈ℝ".contains(c))
}

fn parse_plain(text: &str) -> Generation {
    let mut steps: Vec<Step> = Vec::new();
    let mut current: Option<Step> = None;
    let mut answer = String::new();
    let mut overview: Vec<&str> = Vec::new();

    fn close(current: &mut Option<Step>, steps: &mut Vec<Step>) {
        if let Some(mut step) = current.take() {
            step.content = step.content.trim().to_string();
            steps.push(step);
        }
    }

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();

        if let Some(caps) = numbered_regex().captures(line) {
            close(&mut current, &mut steps);
            let title = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            current = Some(Step::new(
                if title.is_empty() {
                    format!("Step {}", steps.len() + 1)
                } else {
                    title.to_string()
                },
                "",
            ));
        } else if is_conclusion(&lower) {
            if answer.is_empty() {
                answer = match line.split_once(':') {
                    Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
                    _ => line.to_string(),
                };
            }
            match current.as_mut() {
                Some(step) => {
                    step.content.push_str(line);
                    step.content.push('\n');
                }
                None => overview.push(line),
            }
        } else if let Some(step) = current.as_mut() {
            if is_expression(line) {
                match step.expression.as_mut() {
                    Some(expr) => {
                        expr.push('\n');
                        expr.push_str(line);
                    }
                    None => step.expression = Some(line.to_string()),
                }
            } else {
                step.content.push_str(line);
                step.content.push('\n');
            }
        } else {
            overview.push(line);
        }
    }
    close(&mut current, &mut steps);

    if !overview.is_empty() {
        steps.insert(0, Step::new("Overview", overview.join("\n")));
    }
    if steps.is_empty() && !text.trim().is_empty() {
        steps.push(Step::new("Complete Solution", text.trim()));
    }

    Generation { answer, steps }
}

fn finish(mut generation: Generation) -> Generation {
    if generation.answer.trim().is_empty() {
        generation.answer = generation
            .steps
            .last()
            .and_then(|step| {
                step.content
                    .lines()
                    .rev()
                    .find(|line| {
                        let lower = line.to_lowercase();
                        ["answer", "therefore", "thus", "hence", "result"]
                            .iter()
                            .any(|w| lower.contains(w))
                    })
                    .or_else(|| step.content.lines().last())
                    .map(str::to_string)
            })
            .unwrap_or_default();
    }
    if generation.answer.trim().is_empty() {
        generation.answer = NO_ANSWER.to_string();
    }
    if !generation
        .answer
        .to_lowercase()
        .starts_with(&ANSWER_PREFIX.to_lowercase())
    {
        generation.answer = format!("{} {}", ANSWER_PREFIX, generation.answer.trim());
    }
    generation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latex_is_flattened() {
        assert_eq!(normalize_math(r"$\frac{1}{2} \cdot x^2$"), "(1)/(2) · x²");
        assert_eq!(normalize_math(r"\sqrt{16} \leq \pi"), "√{16} ≤ π");
        assert_eq!(normalize_math("## Result\n**x = 2**"), "Result\nx = 2");
    }

    #[test]
    fn json_solution_is_preferred() {
        let raw = r#"```json
{"final_answer": "x = 2 or x = 3",
 "steps": [
   {"title": "Factor", "explanation": "Split the middle term", "expression": "(x-2)(x-3)=0"},
   {"explanation": "Set each factor to zero"}
 ]}
```"#;
        let generation = parse_generation(raw);
        assert_eq!(generation.answer, "Answer: x = 2 or x = 3");
        assert_eq!(generation.steps.len(), 2);
        assert_eq!(generation.steps[0].expression.as_deref(), Some("(x-2)(x-3)=0"));
        assert_eq!(generation.steps[1].title, "Step 2");
    }

    #[test]
    fn plain_text_is_split_into_steps() {
        let raw = "We solve the quadratic.\n\
                   Step 1: Factor\n\
                   Look for two numbers.\n\
                   (x - 2)(x - 3) = 0\n\
                   2) Solve\n\
                   Each factor gives a root.\n\
                   Therefore x = 2 or x = 3";
        let generation = parse_generation(raw);
        assert_eq!(generation.steps[0].title, "Overview");
        assert_eq!(generation.steps[1].title, "Factor");
        assert_eq!(
            generation.steps[1].expression.as_deref(),
            Some("(x - 2)(x - 3) = 0")
        );
        assert_eq!(generation.steps[2].title, "Solve");
        assert!(generation.steps[2].content.contains("Therefore"));
        assert_eq!(generation.answer, "Answer: Therefore x = 2 or x = 3");
    }

    #[test]
    fn unstructured_text_becomes_single_step() {
        let generation = parse_generation("The area is 12 square units");
        assert_eq!(generation.steps.len(), 1);
        assert_eq!(generation.steps[0].title, "Overview");
        assert_eq!(generation.answer, "Answer: The area is 12 square units");
    }

    #[test]
    fn empty_text_gets_placeholder_answer() {
        let generation = parse_generation("");
        assert!(generation.steps.is_empty());
        assert_eq!(generation.answer, format!("Answer: {}", NO_ANSWER));
    }
}
