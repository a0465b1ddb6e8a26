use anyhow::{anyhow, ensure, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::model::{Correction, Edit, InputMode, PlanStep, TypingPlan};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub char_delay_ms_min: u64,
    pub char_delay_ms_max: u64,
    /// Whitespace gets its own, slower range to mimic word boundaries.
    pub space_delay_ms_min: u64,
    pub space_delay_ms_max: u64,
    pub correction_pause_ms_min: u64,
    pub correction_pause_ms_max: u64,
    pub retype_pause_ms_min: u64,
    pub retype_pause_ms_max: u64,
    pub send_pause_ms_min: u64,
    pub send_pause_ms_max: u64,
    /// Shortest sentence (in chars) that gets a delete/retype correction.
    pub min_correction_len: usize,
    /// Inserted between existing field content and the sentence in append mode.
    pub append_separator: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            char_delay_ms_min: 90,
            char_delay_ms_max: 220,
            space_delay_ms_min: 140,
            space_delay_ms_max: 320,
            correction_pause_ms_min: 180,
            correction_pause_ms_max: 320,
            retype_pause_ms_min: 90,
            retype_pause_ms_max: 160,
            send_pause_ms_min: 260,
            send_pause_ms_max: 520,
            min_correction_len: 4,
            append_separator: "\n".to_string(),
        }
    }
}

/// Upper bound for every configured delay.
pub const MAX_DELAY_MS: u64 = 60_000;

pub fn validate_config(cfg: &PlannerConfig) -> Result<()> {
    for (name, max) in [
        ("char_delay_ms_max", cfg.char_delay_ms_max),
        ("space_delay_ms_max", cfg.space_delay_ms_max),
        ("correction_pause_ms_max", cfg.correction_pause_ms_max),
        ("retype_pause_ms_max", cfg.retype_pause_ms_max),
        ("send_pause_ms_max", cfg.send_pause_ms_max),
    ] {
        ensure!(max <= MAX_DELAY_MS, "{name} must be <= {MAX_DELAY_MS}");
    }
    ensure!(
        cfg.char_delay_ms_min > 0 && cfg.space_delay_ms_min > 0,
        "per-character delays must be > 0"
    );
    ensure!(
        cfg.char_delay_ms_min <= cfg.char_delay_ms_max,
        "char_delay_ms_min must be <= char_delay_ms_max"
    );
    ensure!(
        cfg.space_delay_ms_min <= cfg.space_delay_ms_max,
        "space_delay_ms_min must be <= space_delay_ms_max"
    );
    ensure!(
        cfg.correction_pause_ms_min > 0
            && cfg.correction_pause_ms_min <= cfg.correction_pause_ms_max,
        "correction pause range must be non-empty and > 0"
    );
    ensure!(
        cfg.retype_pause_ms_min > 0 && cfg.retype_pause_ms_min <= cfg.retype_pause_ms_max,
        "retype pause range must be non-empty and > 0"
    );
    ensure!(
        cfg.send_pause_ms_min <= cfg.send_pause_ms_max,
        "send_pause_ms_min must be <= send_pause_ms_max"
    );
    // A correction needs an interior position: not the first char, not the last.
    ensure!(
        cfg.min_correction_len >= 3,
        "min_correction_len must be >= 3"
    );
    Ok(())
}

/// Sample from a bell curve centered in `[min, max]`, clamped to the range.
fn bounded_delay_ms(min: u64, max: u64, rng: &mut impl Rng) -> u64 {
    if max <= min {
        return min;
    }
    let mean = min as f64 + (max - min) as f64 / 2.0;
    let stddev = ((max - min) as f64 / 4.0).max(1.0);
    match Normal::new(mean, stddev) {
        Ok(dist) => dist.sample(rng).clamp(min as f64, max as f64).round() as u64,
        Err(_) => rng.gen_range(min..=max),
    }
}

fn char_delay_ms(c: char, cfg: &PlannerConfig, rng: &mut impl Rng) -> u64 {
    if c.is_whitespace() {
        bounded_delay_ms(cfg.space_delay_ms_min, cfg.space_delay_ms_max, rng)
    } else {
        bounded_delay_ms(cfg.char_delay_ms_min, cfg.char_delay_ms_max, rng)
    }
}

fn correction_index(len: usize, cfg: &PlannerConfig, rng: &mut impl Rng) -> Option<usize> {
    if len < cfg.min_correction_len {
        return None;
    }
    Some(rng.gen_range(1..len - 1))
}

/// Build the timed mutation steps that type `target` into a field currently
/// holding `existing`.
///
/// Returns `Ok(None)` in skip mode when the field already has content. Step
/// delays are relative to the moment the plan is built and never decrease.
pub fn build_plan(
    target: &str,
    mode: InputMode,
    existing: &str,
    cfg: &PlannerConfig,
    rng: &mut impl Rng,
) -> Result<Option<TypingPlan>> {
    validate_config(cfg)?;
    ensure!(!target.is_empty(), "nothing to type");

    let has_content = !existing.trim().is_empty();
    let mut steps = Vec::new();

    let (base_text, existing_text) = match mode {
        InputMode::Skip if has_content => return Ok(None),
        InputMode::Skip => (String::new(), String::new()),
        InputMode::Clear => {
            steps.push(PlanStep {
                delay_ms: 0,
                edit: Edit::Clear,
                text: String::new(),
            });
            (String::new(), String::new())
        }
        InputMode::Append if has_content => (
            format!("{existing}{}", cfg.append_separator),
            existing.to_string(),
        ),
        InputMode::Append => (String::new(), String::new()),
    };

    let len = target.chars().count();
    let fix_at = correction_index(len, cfg, rng);

    let mut text = base_text.clone();
    let mut elapsed = 0u64;
    let mut correction = None;

    for (i, c) in target.chars().enumerate() {
        elapsed = elapsed.saturating_add(char_delay_ms(c, cfg, rng));
        text.push(c);
        steps.push(PlanStep {
            delay_ms: elapsed,
            edit: Edit::Insert { ch: c },
            text: text.clone(),
        });

        if fix_at == Some(i) {
            let delete_at = elapsed.saturating_add(bounded_delay_ms(
                cfg.correction_pause_ms_min,
                cfg.correction_pause_ms_max,
                rng,
            ));
            let mut without_last = text.clone();
            without_last.pop();
            steps.push(PlanStep {
                delay_ms: delete_at,
                edit: Edit::DeleteLast { deleted: c },
                text: without_last,
            });

            let retype_at = delete_at.saturating_add(bounded_delay_ms(
                cfg.retype_pause_ms_min,
                cfg.retype_pause_ms_max,
                rng,
            ));
            steps.push(PlanStep {
                delay_ms: retype_at,
                edit: Edit::Insert { ch: c },
                text: text.clone(),
            });

            correction = Some(Correction {
                index: i,
                deleted: c,
                delete_delay_ms: delete_at,
                retype_delay_ms: retype_at,
            });
            elapsed = retype_at;
        }
    }

    let send_delay_ms = elapsed.saturating_add(bounded_delay_ms(
        cfg.send_pause_ms_min,
        cfg.send_pause_ms_max,
        rng,
    ));

    let plan = TypingPlan {
        target: target.to_string(),
        mode,
        base_text,
        existing_text,
        steps,
        correction,
        send_delay_ms,
    };

    let replayed = crate::sim::replay_plan(&plan)?;
    if replayed != plan.final_text() {
        return Err(anyhow!(
            "planner bug: replayed text does not match the target"
        ));
    }

    Ok(Some(plan))
}
