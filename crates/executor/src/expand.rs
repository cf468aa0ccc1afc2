//! Config grammar parsing and cartesian expansion.
//!
//! Each config entry's fields may be a scalar or an array; arrays
//! expand cartesian. Sampler and scheduler accept the `"*"` wildcard
//! ("every one the host knows"). Checkpoint and lora values ending in a
//! directory separator expand to every installed file under that
//! folder. The result is a flat queue of [`CellSpec`]s, stably sorted
//! by `(model, lora stack, positive, negative)` so the one-slot model
//! cache almost never misses.

use gridsweep_manifest::Cell;
use serde_json::Value;

use crate::error::SweepError;

/// Checkpoint sentinel meaning "use what the host already supplied".
pub const DEFAULT_MODEL: &str = "Default";

/// Lora sentinel meaning "empty stack".
pub const EMPTY_LORA_STACK: &str = "None";

/// Separator between slots of a lora stack.
const STACK_SEPARATOR: &str = " + ";

// ---------------------------------------------------------------------------
// CellSpec
// ---------------------------------------------------------------------------

/// A fully expanded configuration point, before it is bound to a job's
/// resolution and batch index.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSpec {
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub lora: String,
    pub str_model: f64,
    pub str_clip: f64,
    pub denoise: f64,
    pub positive: String,
    pub negative: String,
    /// `None` = the "Default" sentinel.
    pub model: Option<String>,
    pub seed: u64,
}

impl CellSpec {
    /// Bind this spec to a job, producing the candidate manifest cell.
    pub fn to_cell(&self, width: u32, height: u32, batch_idx: u32) -> Cell {
        Cell {
            sampler: self.sampler.clone(),
            scheduler: self.scheduler.clone(),
            steps: self.steps,
            cfg: self.cfg,
            denoise: self.denoise,
            seed: self.seed,
            width,
            height,
            lora: self.lora.clone(),
            str_model: self.str_model,
            str_clip: self.str_clip,
            positive: self.positive.clone(),
            negative: self.negative.clone(),
            model: self.model.clone(),
            batch_idx,
            id: 0,
            file: String::new(),
            duration: 0.0,
            rejected: false,
        }
    }
}

/// One entry of a parsed lora stack.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraDef {
    pub name: String,
    pub strength_model: f64,
    pub strength_clip: f64,
}

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

/// Parse a JSON input, naming the failing field on error.
pub fn parse_json(raw: &str, input: &'static str) -> Result<Value, SweepError> {
    serde_json::from_str(raw.trim()).map_err(|e| SweepError::ConfigParse {
        input,
        message: e.to_string(),
    })
}

/// Parse a prompt-style list: a JSON array of strings, a comma-separated
/// string, or a bare string.
pub fn parse_string_list(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        Ok(value) => vec![value_to_string(&value)],
        Err(_) => {
            if raw.contains(',') {
                raw.split(',').map(|s| s.trim().to_string()).collect()
            } else {
                vec![raw.to_string()]
            }
        }
    }
}

/// Parse a float list: JSON array, JSON scalar, or comma-separated
/// fallback. Unparseable input degrades to `[1.0]`.
pub fn parse_float_list(raw: &str) -> Vec<f64> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Array(items)) => items.iter().filter_map(value_to_f64).collect(),
        Ok(value) => value_to_f64(&value).map(|v| vec![v]).unwrap_or(vec![1.0]),
        Err(_) => {
            let parsed: Vec<f64> = raw
                .split(',')
                .filter_map(|s| s.trim().parse::<f64>().ok())
                .collect();
            if parsed.is_empty() {
                vec![1.0]
            } else {
                parsed
            }
        }
    }
}

/// Parse the resolutions input: a JSON array of `[width, height]` pairs.
pub fn parse_resolutions(raw: &str) -> Result<Vec<(u32, u32)>, SweepError> {
    let value = parse_json(raw, "Resolutions JSON")?;
    let Value::Array(pairs) = value else {
        return Err(SweepError::ConfigParse {
            input: "Resolutions JSON",
            message: "expected an array of [width, height] pairs".into(),
        });
    };
    let mut out = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let dims: Option<(u32, u32)> = pair.as_array().and_then(|a| {
            if a.len() == 2 {
                Some((a[0].as_u64()? as u32, a[1].as_u64()? as u32))
            } else {
                None
            }
        });
        match dims {
            Some(dims) => out.push(dims),
            None => {
                return Err(SweepError::ConfigParse {
                    input: "Resolutions JSON",
                    message: format!("invalid resolution entry: {pair}"),
                })
            }
        }
    }
    Ok(out)
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A config field that may be a scalar or an array.
fn scalar_or_list(entry: &Value, field: &str) -> Option<Vec<Value>> {
    match entry.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.clone()),
        Some(other) => Some(vec![other.clone()]),
    }
}

fn string_field(entry: &Value, field: &str, default: &str) -> Vec<String> {
    scalar_or_list(entry, field)
        .map(|items| items.iter().map(value_to_string).collect())
        .unwrap_or_else(|| vec![default.to_string()])
}

fn f64_field(entry: &Value, field: &str, default: f64) -> Vec<f64> {
    scalar_or_list(entry, field)
        .map(|items| items.iter().filter_map(value_to_f64).collect::<Vec<_>>())
        .filter(|v: &Vec<f64>| !v.is_empty())
        .unwrap_or_else(|| vec![default])
}

fn u32_field(entry: &Value, field: &str, default: u32) -> Vec<u32> {
    scalar_or_list(entry, field)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| value_to_f64(v).map(|f| f as u32))
                .collect::<Vec<_>>()
        })
        .filter(|v: &Vec<u32>| !v.is_empty())
        .unwrap_or_else(|| vec![default])
}

// ---------------------------------------------------------------------------
// Prompt pairing
// ---------------------------------------------------------------------------

/// Pair positive and negative prompt lists.
///
/// Lists of equal length greater than one are zipped 1-to-1; anything
/// else is a cartesian product. Users relying on pairing must supply
/// matching lengths; this rule is documented on the node.
pub fn pair_prompts(positive: &[String], negative: &[String]) -> Vec<(String, String)> {
    if positive.len() > 1 && negative.len() > 1 && positive.len() == negative.len() {
        tracing::info!("Matching prompt lists detected, using 1-to-1 pairing");
        positive
            .iter()
            .cloned()
            .zip(negative.iter().cloned())
            .collect()
    } else {
        let mut pairs = Vec::with_capacity(positive.len() * negative.len());
        for p in positive {
            for n in negative {
                pairs.push((p.clone(), n.clone()));
            }
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Folder expansion
// ---------------------------------------------------------------------------

/// Expand a folder-suffixed asset path to every installed file under it.
///
/// An input not ending in `/` passes through unchanged. Any
/// `:model_str:clip_str` suffix is ignored for the folder check.
pub fn expand_folder(input: &str, available: &[String], kind: &str) -> Vec<String> {
    let mut norm = input.replace('\\', "/");
    if let Some(idx) = norm.find(':') {
        norm.truncate(idx);
    }
    if !norm.ends_with('/') {
        return vec![input.to_string()];
    }
    let target = norm.trim_end_matches('/');
    let found: Vec<String> = available
        .iter()
        .filter(|f| f.replace('\\', "/").starts_with(&format!("{target}/")))
        .cloned()
        .collect();
    if found.is_empty() {
        tracing::warn!(folder = input, kind, "No files found in folder");
    }
    found
}

/// Expand one lora stack string, multiplying out any folder slots while
/// preserving their strength suffixes.
fn expand_lora_stack(stack: &str, available: &[String]) -> Vec<String> {
    if stack == EMPTY_LORA_STACK {
        return vec![EMPTY_LORA_STACK.to_string()];
    }
    let slot_choices: Vec<Vec<String>> = stack
        .split(STACK_SEPARATOR)
        .map(|part| {
            let part = part.trim();
            let (base, args) = match part.split_once(':') {
                Some((b, a)) => (b.trim(), format!(":{}", a.trim())),
                None => (part, String::new()),
            };
            if base.replace('\\', "/").ends_with('/') {
                expand_folder(base, available, "loras")
                    .into_iter()
                    .map(|f| format!("{f}{args}"))
                    .collect()
            } else {
                vec![part.to_string()]
            }
        })
        .collect();
    cartesian(&slot_choices)
        .into_iter()
        .map(|combo| combo.join(STACK_SEPARATOR))
        .collect()
}

/// Cartesian product of choice lists. An empty choice list for any slot
/// yields no combinations.
fn cartesian(choices: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = vec![Vec::new()];
    for slot in choices {
        let mut next = Vec::with_capacity(out.len() * slot.len());
        for prefix in &out {
            for choice in slot {
                let mut combo = prefix.clone();
                combo.push(choice.clone());
                next.push(combo);
            }
        }
        out = next;
    }
    out
}

// ---------------------------------------------------------------------------
// Lora definition parsing
// ---------------------------------------------------------------------------

/// Parse a stack string into per-lora definitions.
///
/// Each slot is `name` (inheriting the global strengths) or
/// `name:model_strength[:clip_strength]`.
pub fn parse_lora_stack(stack: &str, global_model: f64, global_clip: f64) -> Vec<LoraDef> {
    if stack == EMPTY_LORA_STACK {
        return Vec::new();
    }
    stack
        .split(STACK_SEPARATOR)
        .map(|part| {
            let part = part.trim();
            let segments: Vec<&str> = part.split(':').collect();
            if segments.len() > 1 {
                LoraDef {
                    name: segments[0].trim().to_string(),
                    strength_model: segments
                        .get(1)
                        .and_then(|s| s.trim().parse().ok())
                        .unwrap_or(1.0),
                    strength_clip: segments
                        .get(2)
                        .and_then(|s| s.trim().parse().ok())
                        .unwrap_or(1.0),
                }
            } else {
                LoraDef {
                    name: part.to_string(),
                    strength_model: global_model,
                    strength_clip: global_clip,
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Inventories and globals needed to expand a config list.
pub struct ExpandContext<'a> {
    /// Every sampler the host knows (for the `"*"` wildcard).
    pub all_samplers: &'a [String],
    /// Every scheduler the host knows.
    pub all_schedulers: &'a [String],
    /// Installed checkpoint paths.
    pub checkpoints: &'a [String],
    /// Installed lora paths.
    pub loras: &'a [String],
    /// Global prompt pairs (overridable per config entry).
    pub prompt_pairs: &'a [(String, String)],
    pub denoise_values: &'a [f64],
    pub base_seed: u64,
    /// Deterministic extra seeds; each base combo is replicated once
    /// per entry with only the seed differing.
    pub extra_seeds: &'a [u64],
}

/// Expand a parsed config list into the sorted work queue.
pub fn expand_configs(configs: &Value, ctx: &ExpandContext<'_>) -> Result<Vec<CellSpec>, SweepError> {
    let Value::Array(entries) = configs else {
        return Err(SweepError::ConfigParse {
            input: "Configs JSON",
            message: "expected an array of config objects".into(),
        });
    };

    let mut expanded = Vec::new();
    for entry in entries {
        if !entry.is_object() {
            return Err(SweepError::ConfigParse {
                input: "Configs JSON",
                message: format!("config entry is not an object: {entry}"),
            });
        }

        let samplers = wildcard_field(entry, "sampler", "euler", ctx.all_samplers);
        let schedulers = wildcard_field(entry, "scheduler", "normal", ctx.all_schedulers);
        let steps_list = u32_field(entry, "steps", 20);
        let cfgs = f64_field(entry, "cfg", 7.0);
        let str_models = f64_field(entry, "str_model", 1.0);
        let str_clips = f64_field(entry, "str_clip", 1.0);

        let models: Vec<Option<String>> = string_field(entry, "model", DEFAULT_MODEL)
            .iter()
            .flat_map(|m| {
                if m == DEFAULT_MODEL {
                    vec![None]
                } else {
                    expand_folder(m, ctx.checkpoints, "checkpoints")
                        .into_iter()
                        .map(Some)
                        .collect()
                }
            })
            .collect();

        let loras: Vec<String> = string_field(entry, "lora", EMPTY_LORA_STACK)
            .iter()
            .flat_map(|l| expand_lora_stack(l, ctx.loras))
            .collect();

        // Entry-level positive/negative override the global prompt lists.
        let entry_pairs = entry_prompt_pairs(entry);
        let pairs: &[(String, String)] = entry_pairs.as_deref().unwrap_or(ctx.prompt_pairs);

        for model in &models {
            for lora in &loras {
                for (positive, negative) in pairs {
                    for sampler in &samplers {
                        for scheduler in &schedulers {
                            for &steps in &steps_list {
                                for &cfg in &cfgs {
                                    for &str_model in &str_models {
                                        for &str_clip in &str_clips {
                                            for &denoise in ctx.denoise_values {
                                                let base = CellSpec {
                                                    sampler: sampler.clone(),
                                                    scheduler: scheduler.clone(),
                                                    steps,
                                                    cfg,
                                                    lora: lora.clone(),
                                                    str_model,
                                                    str_clip,
                                                    denoise,
                                                    positive: positive.clone(),
                                                    negative: negative.clone(),
                                                    model: model.clone(),
                                                    seed: ctx.base_seed,
                                                };
                                                for &seed in ctx.extra_seeds {
                                                    let mut extra = base.clone();
                                                    extra.seed = seed;
                                                    expanded.push(extra);
                                                }
                                                expanded.push(base);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    // Stable sort keyed for model-cache locality. Performance contract,
    // not a correctness one.
    expanded.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    Ok(expanded)
}

fn sort_key(spec: &CellSpec) -> (&str, &str, &str, &str) {
    (
        spec.model.as_deref().unwrap_or(DEFAULT_MODEL),
        &spec.lora,
        &spec.positive,
        &spec.negative,
    )
}

fn wildcard_field(entry: &Value, field: &str, default: &str, all: &[String]) -> Vec<String> {
    let values = string_field(entry, field, default);
    if values.iter().any(|v| v == "*") {
        all.to_vec()
    } else {
        values
    }
}

fn entry_prompt_pairs(entry: &Value) -> Option<Vec<(String, String)>> {
    let positive = scalar_or_list(entry, "positive")
        .map(|items| items.iter().map(value_to_string).collect::<Vec<_>>());
    let negative = scalar_or_list(entry, "negative")
        .map(|items| items.iter().map(value_to_string).collect::<Vec<_>>());
    if positive.is_none() && negative.is_none() {
        return None;
    }
    let positive = positive.unwrap_or_else(|| vec![String::new()]);
    let negative = negative.unwrap_or_else(|| vec![String::new()]);
    Some(pair_prompts(&positive, &negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ctx<'a>(
        pairs: &'a [(String, String)],
        denoise: &'a [f64],
        samplers: &'a [String],
        schedulers: &'a [String],
        checkpoints: &'a [String],
        loras: &'a [String],
        extra: &'a [u64],
    ) -> ExpandContext<'a> {
        ExpandContext {
            all_samplers: samplers,
            all_schedulers: schedulers,
            checkpoints,
            loras,
            prompt_pairs: pairs,
            denoise_values: denoise,
            base_seed: 0,
            extra_seeds: extra,
        }
    }

    #[test]
    fn parse_string_list_forms() {
        assert_eq!(parse_string_list("\"a\""), strings(&["a"]));
        assert_eq!(parse_string_list("[\"a\",\"b\"]"), strings(&["a", "b"]));
        assert_eq!(parse_string_list("plain prompt"), strings(&["plain prompt"]));
        assert_eq!(parse_string_list("a, b"), strings(&["a", "b"]));
    }

    #[test]
    fn parse_float_list_forms() {
        assert_eq!(parse_float_list("1.0"), vec![1.0]);
        assert_eq!(parse_float_list("[0.5, 0.7]"), vec![0.5, 0.7]);
        assert_eq!(parse_float_list("0.5, 0.7"), vec![0.5, 0.7]);
        assert_eq!(parse_float_list("garbage"), vec![1.0]);
    }

    #[test]
    fn parse_json_names_the_field() {
        let err = parse_json("{broken", "Configs JSON").unwrap_err();
        assert_matches!(err, SweepError::ConfigParse { input: "Configs JSON", .. });
        assert!(err.to_string().contains("Configs JSON"));
    }

    #[test]
    fn resolutions_parse_and_reject() {
        assert_eq!(parse_resolutions("[[64, 64], [512, 768]]").unwrap(), vec![(64, 64), (512, 768)]);
        assert_matches!(
            parse_resolutions("[[64]]"),
            Err(SweepError::ConfigParse { input: "Resolutions JSON", .. })
        );
    }

    #[test]
    fn prompt_pairing_zips_equal_lists() {
        let pairs = pair_prompts(&strings(&["a", "b"]), &strings(&["x", "y"]));
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("a".into(), "x".into()));
        assert_eq!(pairs[1], ("b".into(), "y".into()));
    }

    #[test]
    fn prompt_pairing_crosses_unequal_lists() {
        let pairs = pair_prompts(&strings(&["a", "b"]), &strings(&["x", "y", "z"]));
        assert_eq!(pairs.len(), 6);
        let single = pair_prompts(&strings(&["a"]), &strings(&["x", "y"]));
        assert_eq!(single.len(), 2);
    }

    #[test]
    fn folder_expansion() {
        let available = strings(&["sdxl/a.safetensors", "sdxl/b.safetensors", "sd15/c.safetensors"]);
        assert_eq!(
            expand_folder("sdxl/", &available, "checkpoints"),
            strings(&["sdxl/a.safetensors", "sdxl/b.safetensors"])
        );
        // Non-folder input passes through.
        assert_eq!(expand_folder("sd15/c.safetensors", &available, "checkpoints"), strings(&["sd15/c.safetensors"]));
        // Missing folder expands to nothing.
        assert!(expand_folder("missing/", &available, "checkpoints").is_empty());
    }

    #[test]
    fn lora_stack_folder_expansion_preserves_strengths() {
        let available = strings(&["styles/s1.safetensors", "styles/s2.safetensors"]);
        let expanded = expand_lora_stack("detail.safetensors:0.8:0.9 + styles/:0.5", &available);
        assert_eq!(
            expanded,
            strings(&[
                "detail.safetensors:0.8:0.9 + styles/s1.safetensors:0.5",
                "detail.safetensors:0.8:0.9 + styles/s2.safetensors:0.5",
            ])
        );
    }

    #[test]
    fn lora_definitions_inherit_global_strengths() {
        let defs = parse_lora_stack("a.safetensors + b.safetensors:0.4:0.6", 0.9, 0.8);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].strength_model, 0.9);
        assert_eq!(defs[0].strength_clip, 0.8);
        assert_eq!(defs[1].strength_model, 0.4);
        assert_eq!(defs[1].strength_clip, 0.6);
        assert!(parse_lora_stack("None", 1.0, 1.0).is_empty());
    }

    #[test]
    fn cartesian_shape_matches_axis_product() {
        let configs: Value = serde_json::from_str(
            r#"[{"sampler": ["euler", "dpmpp_2m"], "scheduler": "normal", "steps": [10, 20, 30], "cfg": [5.0, 7.0]}]"#,
        )
        .unwrap();
        let pairs = vec![("a".to_string(), String::new())];
        let denoise = [1.0, 0.7];
        let samplers = strings(&["euler"]);
        let schedulers = strings(&["normal"]);
        let none: Vec<String> = Vec::new();
        let extra = [11u64, 22];
        let specs = expand_configs(
            &configs,
            &ctx(&pairs, &denoise, &samplers, &schedulers, &none, &none, &extra),
        )
        .unwrap();
        // 2 samplers * 3 steps * 2 cfg * 2 denoise * (1 + 2 extra seeds)
        assert_eq!(specs.len(), 2 * 3 * 2 * 2 * 3);
    }

    #[test]
    fn wildcard_sampler_uses_host_inventory() {
        let configs: Value = serde_json::from_str(r#"[{"sampler": "*", "scheduler": "*"}]"#).unwrap();
        let pairs = vec![("a".to_string(), String::new())];
        let denoise = [1.0];
        let samplers = strings(&["euler", "heun", "lms"]);
        let schedulers = strings(&["normal", "karras"]);
        let none: Vec<String> = Vec::new();
        let specs = expand_configs(
            &configs,
            &ctx(&pairs, &denoise, &samplers, &schedulers, &none, &none, &[]),
        )
        .unwrap();
        assert_eq!(specs.len(), 3 * 2);
    }

    #[test]
    fn expansion_is_sorted_for_cache_locality() {
        let configs: Value = serde_json::from_str(
            r#"[{"model": ["b.safetensors", "a.safetensors"], "lora": ["z.safetensors", "None"]}]"#,
        )
        .unwrap();
        let pairs = vec![("p".to_string(), String::new())];
        let denoise = [1.0];
        let samplers = strings(&["euler"]);
        let schedulers = strings(&["normal"]);
        let ckpts = strings(&["a.safetensors", "b.safetensors"]);
        let none: Vec<String> = Vec::new();
        let specs = expand_configs(
            &configs,
            &ctx(&pairs, &denoise, &samplers, &schedulers, &ckpts, &none, &[]),
        )
        .unwrap();
        let models: Vec<_> = specs.iter().map(|s| s.model.clone().unwrap()).collect();
        assert_eq!(
            models,
            strings(&["a.safetensors", "a.safetensors", "b.safetensors", "b.safetensors"])
        );
        // Within a model, lora order is stable-sorted too.
        assert_eq!(specs[0].lora, "None");
        assert_eq!(specs[1].lora, "z.safetensors");
    }

    #[test]
    fn entry_prompts_override_globals() {
        let configs: Value =
            serde_json::from_str(r#"[{"positive": ["p1", "p2"], "negative": ["n1", "n2"]}]"#).unwrap();
        let pairs = vec![("global".to_string(), String::new())];
        let denoise = [1.0];
        let samplers = strings(&["euler"]);
        let schedulers = strings(&["normal"]);
        let none: Vec<String> = Vec::new();
        let specs = expand_configs(
            &configs,
            &ctx(&pairs, &denoise, &samplers, &schedulers, &none, &none, &[]),
        )
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.positive.starts_with('p')));
    }
}
