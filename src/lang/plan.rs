//! Plan-trace parsing: one grounded action per line.

/// One line of a plan file: a grounded action name and its object arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub action: String,
    pub args: Vec<String>,
}

/// Parses a plan trace. Blank lines and `;`-prefixed comment lines are
/// discarded wherever they appear; each remaining line is an action name
/// followed by object names, with or without surrounding parentheses.
pub fn parse_plan(text: &str) -> Vec<PlanStep> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                return None;
            }
            let line = line
                .strip_prefix('(')
                .and_then(|l| l.strip_suffix(')'))
                .unwrap_or(line);
            let mut parts = line.split_whitespace();
            let action = parts.next()?.to_string();
            Some(PlanStep {
                action,
                args: parts.map(str::to_string).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_plan_with_comments() {
        let text = "; solution found\n(make s1)\n(put-on-tray s1 t1)\n\n(move t1 kitchen table)\n; cost = 3\n";
        let plan = parse_plan(text);
        assert_eq!(
            plan,
            vec![
                PlanStep {
                    action: "make".to_string(),
                    args: vec!["s1".to_string()],
                },
                PlanStep {
                    action: "put-on-tray".to_string(),
                    args: vec!["s1".to_string(), "t1".to_string()],
                },
                PlanStep {
                    action: "move".to_string(),
                    args: vec!["t1".to_string(), "kitchen".to_string(), "table".to_string()],
                },
            ]
        );
    }

    #[test]
    fn parses_bare_lines_without_parens() {
        let plan = parse_plan("move t1 kitchen table");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action, "move");
        assert_eq!(plan[0].args, vec!["t1", "kitchen", "table"]);
    }
}
