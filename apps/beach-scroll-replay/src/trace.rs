//! Recorded gesture traces.
//!
//! A trace is a JSON array of timestamped steps:
//!
//! ```json
//! [
//!   { "t_ms": 0,  "kind": "down", "id": 1, "x": 120, "y": 400 },
//!   { "t_ms": 16, "kind": "move", "id": 1, "x": 120, "y": 430 },
//!   { "t_ms": 90, "kind": "up",   "id": 1 },
//!   { "t_ms": 900, "kind": "exit" }
//! ]
//! ```

use anyhow::{Context, Result, bail};
use beach_touch_scroll::ScrollConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TraceStep {
    pub t_ms: u64,
    #[serde(flatten)]
    pub action: TraceAction,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceAction {
    Down {
        id: u64,
        x: f64,
        y: f64,
    },
    Move {
        id: u64,
        x: f64,
        y: f64,
    },
    Up {
        id: u64,
    },
    Cancel {
        id: u64,
    },
    Exit {
        #[serde(default = "default_emit_exit")]
        emit_exit: bool,
    },
    Config {
        config: ScrollConfig,
    },
    Resize {
        rows: u16,
        #[serde(default)]
        line_height: Option<f64>,
    },
}

fn default_emit_exit() -> bool {
    true
}

pub fn parse(contents: &str) -> Result<Vec<TraceStep>> {
    let mut steps: Vec<TraceStep> = serde_json::from_str(contents).context("malformed trace")?;
    if steps.is_empty() {
        bail!("trace has no steps");
    }
    // Stable, so steps sharing a timestamp keep their recorded order.
    steps.sort_by_key(|step| step.t_ms);
    Ok(steps)
}

pub fn load(path: &Path) -> Result<Vec<TraceStep>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read trace {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid trace {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let steps = parse(
            r#"[
                {"t_ms": 0, "kind": "down", "id": 1, "x": 10, "y": 20},
                {"t_ms": 16, "kind": "move", "id": 1, "x": 10, "y": 40.5},
                {"t_ms": 40, "kind": "up", "id": 1},
                {"t_ms": 41, "kind": "cancel", "id": 2},
                {"t_ms": 50, "kind": "resize", "rows": 40},
                {"t_ms": 60, "kind": "config", "config": {"slop_px": 4.0}},
                {"t_ms": 70, "kind": "exit"}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(
            steps[1].action,
            TraceAction::Move {
                id: 1,
                x: 10.0,
                y: 40.5
            }
        );
        assert_eq!(
            steps[4].action,
            TraceAction::Resize {
                rows: 40,
                line_height: None
            }
        );
        match &steps[5].action {
            TraceAction::Config { config } => assert_eq!(config.slop_px, 4.0),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(steps[6].action, TraceAction::Exit { emit_exit: true });
    }

    #[test]
    fn steps_are_ordered_by_time() {
        let steps = parse(
            r#"[
                {"t_ms": 30, "kind": "up", "id": 1},
                {"t_ms": 0, "kind": "down", "id": 1, "x": 0, "y": 0}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps[0].t_ms, 0);
        assert_eq!(steps[1].t_ms, 30);
    }

    #[test]
    fn rejects_empty_and_unknown_steps() {
        assert!(parse("[]").is_err());
        assert!(parse(r#"[{"t_ms": 0, "kind": "wiggle"}]"#).is_err());
    }
}
