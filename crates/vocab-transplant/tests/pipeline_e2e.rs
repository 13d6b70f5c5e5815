//! End-to-end transplant over on-disk model directories.

mod common;

use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

use common::*;
use vocab_transplant::{
    plan_transplant, run_transplant, HeadPolicy, MappingSource, OutputDType, TokenOverride,
    TransplantConfig, TransplantError, TransplantRequest,
};

struct Dirs {
    _root: TempDir,
    donor: std::path::PathBuf,
    target: std::path::PathBuf,
    output: std::path::PathBuf,
}

fn dirs() -> Dirs {
    let root = TempDir::new().unwrap();
    let donor = root.path().join("donor");
    let target = root.path().join("target");
    std::fs::create_dir(&donor).unwrap();
    std::fs::create_dir(&target).unwrap();
    write_donor(&donor);
    write_target(&target);
    let output = root.path().join("output");
    Dirs {
        _root: root,
        donor,
        target,
        output,
    }
}

fn request(d: &Dirs, config: TransplantConfig) -> TransplantRequest {
    TransplantRequest {
        donor_dir: d.donor.clone(),
        target_dir: d.target.clone(),
        output_dir: d.output.clone(),
        config,
        overwrite: false,
    }
}

fn row(data: &[f32], r: usize) -> &[f32] {
    &data[r * HIDDEN..(r + 1) * HIDDEN]
}

fn read_config(dir: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join("config.json")).unwrap()).unwrap()
}

#[test]
fn test_single_file_transplant() {
    let d = dirs();
    let report = run_transplant(&request(&d, TransplantConfig::default())).unwrap();

    let weights = d.output.join("model.safetensors");
    let (shape, embed) = read_f32(&weights, "model.embed_tokens.weight");
    assert_eq!(shape, vec![8, HIDDEN]);
    let (_, head) = read_f32(&weights, "lm_head.weight");
    let (_, norm) = read_f32(&weights, "model.norm.weight");
    assert_eq!(norm, vec![1.0; HIDDEN]);

    let donor_embed = matrix(6, HIDDEN, 0.0);
    let donor_head = matrix(6, HIDDEN, 100.0);

    // "<|end|>" aligned to donor "</s>"
    assert_eq!(row(&embed, 1), row(&donor_embed, 1));
    assert_eq!(row(&head, 1), row(&donor_head, 1));

    // "hello world" -> [hello, world]
    assert_eq!(row(&embed, 4), row(&donor_embed, 3));
    let expected: Vec<f32> = (0..HIDDEN)
        .map(|c| (row(&donor_head, 2)[c] + 0.5 * row(&donor_head, 3)[c]) / 1.5)
        .collect();
    for (a, e) in row(&head, 4).iter().zip(&expected) {
        assert!((a - e).abs() < 1e-4);
    }

    // "foo" is donor id 4
    assert_eq!(row(&embed, 5), row(&donor_embed, 4));

    // declared-but-unused rows
    assert!(row(&embed, 6).iter().chain(row(&embed, 7)).all(|v| *v == 0.0));
    assert!(row(&head, 6).iter().chain(row(&head, 7)).all(|v| *v == 0.0));

    assert_eq!(report.stats.head_copies, 5);
    assert_eq!(report.stats.head_combined, 1);
    assert_eq!(report.stats.head_zeros, 2);
    assert_eq!(report.stats.head_total(), 8);
    assert!(report.alignment.iter().any(|o| o.is_aligned()));

    let config = read_config(&d.output);
    assert_eq!(config["vocab_size"], 8);
    assert_eq!(config["hidden_size"], HIDDEN);
    assert_eq!(config["eos_token_id"], 1);
    assert_eq!(config["pad_token_id"], 1);
    assert_eq!(config["bos_token_id"], Value::Null);
    assert_eq!(config["tie_word_embeddings"], false);

    assert_eq!(
        std::fs::read(d.output.join("tokenizer.json")).unwrap(),
        std::fs::read(d.target.join("tokenizer.json")).unwrap()
    );

    // donor has no BOS: copied tokenizer config is patched
    assert!(report.bos_patched);
    let tok_config = std::fs::read_to_string(d.output.join("tokenizer_config.json")).unwrap();
    assert!(tok_config.contains("\"add_bos_token\": false"));
    assert!(!tok_config.contains("bos_token }}"));
}

#[test]
fn test_manual_override_and_report() {
    let d = dirs();
    let mut config = TransplantConfig::default();
    config.overrides.push(TokenOverride::new("foo", "bar"));
    run_transplant(&request(&d, config)).unwrap();

    let (_, embed) = read_f32(&d.output.join("model.safetensors"), "model.embed_tokens.weight");
    assert_eq!(row(&embed, 5), row(&matrix(6, HIDDEN, 0.0), 5));
}

#[test]
fn test_override_target_must_be_single_token() {
    let d = dirs();
    let mut config = TransplantConfig::default();
    config.overrides.push(TokenOverride::new("foo world", "bar"));
    let err = run_transplant(&request(&d, config)).unwrap_err();
    assert!(matches!(
        err,
        TransplantError::OverrideTargetNotSingle { count: 2, .. }
    ));
    assert!(!d.output.exists());
}

#[test]
fn test_existing_output_requires_overwrite() {
    let d = dirs();
    std::fs::create_dir(&d.output).unwrap();
    std::fs::write(d.output.join("keep.txt"), "x").unwrap();

    let err = run_transplant(&request(&d, TransplantConfig::default())).unwrap_err();
    assert!(matches!(err, TransplantError::OutputExists { .. }));
    assert!(d.output.join("keep.txt").exists());

    let mut req = request(&d, TransplantConfig::default());
    req.overwrite = true;
    run_transplant(&req).unwrap();
    assert!(!d.output.join("keep.txt").exists());
    assert!(d.output.join("model.safetensors").exists());
}

#[test]
fn test_missing_hidden_size() {
    let d = dirs();
    write_json(&d.donor.join("config.json"), &json!({"vocab_size": 6}));
    let err = run_transplant(&request(&d, TransplantConfig::default())).unwrap_err();
    assert!(matches!(
        err,
        TransplantError::MissingConfigField {
            field: "hidden_size",
            ..
        }
    ));
}

#[test]
fn test_declared_size_too_small() {
    let d = dirs();
    write_json(&d.target.join("config.json"), &json!({"vocab_size": 5}));
    let err = run_transplant(&request(&d, TransplantConfig::default())).unwrap_err();
    assert!(matches!(
        err,
        TransplantError::VocabSizeMismatch {
            used: 6,
            declared: 5
        }
    ));
}

#[test]
fn test_sharded_tied_donor_first_claim_f16() {
    let d = dirs();
    std::fs::remove_file(d.donor.join("model.safetensors")).unwrap();
    write_json(
        &d.donor.join("config.json"),
        &json!({"hidden_size": HIDDEN, "vocab_size": 6, "tie_word_embeddings": true}),
    );
    write_safetensors(
        &d.donor.join("model-00001-of-00002.safetensors"),
        &[("model.embed_tokens.weight", matrix(6, HIDDEN, 0.0), vec![6, HIDDEN])],
    );
    write_safetensors(
        &d.donor.join("model-00002-of-00002.safetensors"),
        &[("model.norm.weight", vec![1.0; HIDDEN], vec![HIDDEN])],
    );
    write_json(
        &d.donor.join("model.safetensors.index.json"),
        &json!({
            "metadata": {"total_size": 112},
            "weight_map": {
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.norm.weight": "model-00002-of-00002.safetensors"
            }
        }),
    );

    let config = TransplantConfig {
        head: HeadPolicy::FirstClaim { scale: 0.0 },
        output_dtype: OutputDType::F16,
        ..Default::default()
    };
    let report = run_transplant(&request(&d, config)).unwrap();

    let shard1 = d.output.join("model-00001-of-00002.safetensors");
    assert_eq!(
        tensor_names(&shard1),
        vec!["lm_head.weight", "model.embed_tokens.weight"]
    );
    let bytes = std::fs::read(&shard1).unwrap();
    let st = safetensors::SafeTensors::deserialize(&bytes).unwrap();
    let head = st.tensor("lm_head.weight").unwrap();
    assert_eq!(head.dtype(), safetensors::Dtype::F16);
    assert_eq!(head.shape(), &[8, HIDDEN]);

    let (_, norm) = read_f32(&d.output.join("model-00002-of-00002.safetensors"), "model.norm.weight");
    assert_eq!(norm, vec![1.0; HIDDEN]);

    let index: Value = serde_json::from_str(
        &std::fs::read_to_string(d.output.join("model.safetensors.index.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        index["weight_map"]["lm_head.weight"],
        "model-00001-of-00002.safetensors"
    );
    // two [8, 4] f16 matrices plus the [4] f32 norm
    assert_eq!(index["metadata"]["total_size"], 2 * 8 * HIDDEN * 2 + HIDDEN * 4);

    // "hello world" shares prefix "hello" with id 2
    assert_eq!(report.stats.head_zeros, 3);
    assert_eq!(report.stats.head_copies, 5);
}

#[test]
fn test_plan_without_weights() {
    let d = dirs();
    std::fs::remove_file(d.donor.join("model.safetensors")).unwrap();

    let plan = plan_transplant(&d.donor, &d.target, &TransplantConfig::default()).unwrap();
    assert_eq!(plan.mappings.len(), 6);
    assert_eq!(plan.mappings[1].source, MappingSource::Override);
    assert_eq!(plan.mappings[4].text, "hello world");
    assert_eq!(plan.mappings[4].mapping.ids(), &[2, 3]);
    assert_eq!(plan.stats.mapping_counts.get(&2), Some(&1));
    assert_eq!(plan.stats.declared_size, 8);
}

#[test]
fn test_missing_donor_directory() {
    let d = dirs();
    let mut req = request(&d, TransplantConfig::default());
    req.donor_dir = d.donor.join("missing");
    let err = run_transplant(&req).unwrap_err();
    assert!(matches!(
        err,
        TransplantError::DirectoryNotFound { role: "Donor", .. }
    ));
}
