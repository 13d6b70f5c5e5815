//! Fixture builders for on-disk model directories.

#![allow(dead_code)]

use std::path::Path;

use safetensors::tensor::{Dtype, TensorView};
use serde_json::{json, Value};

/// Write a whitespace-split WordLevel `tokenizer.json`. Tokens starting with
/// `<` are registered as special added tokens.
pub fn write_tokenizer(dir: &Path, tokens: &[&str]) {
    let vocab: serde_json::Map<String, Value> = tokens
        .iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), json!(id)))
        .collect();
    let added: Vec<Value> = tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| token.starts_with('<'))
        .map(|(id, token)| {
            json!({
                "id": id,
                "content": token,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    let tokenizer = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added,
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": tokens[0]
        }
    });
    write_json(&dir.join("tokenizer.json"), &tokenizer);
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Rows `[rows, cols]` with `value(r, c) = base + 10 * r + c`.
pub fn matrix(rows: usize, cols: usize, base: f32) -> Vec<f32> {
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| base + 10.0 * r as f32 + c as f32))
        .collect()
}

/// Write an f32 safetensors file.
pub fn write_safetensors(path: &Path, tensors: &[(&str, Vec<f32>, Vec<usize>)]) {
    let views: Vec<(String, TensorView<'_>)> = tensors
        .iter()
        .map(|(name, data, shape)| {
            let view = TensorView::new(
                Dtype::F32,
                shape.clone(),
                bytemuck::cast_slice(data.as_slice()),
            )
            .unwrap();
            (name.to_string(), view)
        })
        .collect();
    safetensors::tensor::serialize_to_file(views, &None, path).unwrap();
}

/// Read one f32 tensor as `(shape, data)`.
pub fn read_f32(path: &Path, name: &str) -> (Vec<usize>, Vec<f32>) {
    let bytes = std::fs::read(path).unwrap();
    let st = safetensors::SafeTensors::deserialize(&bytes).unwrap();
    let view = st.tensor(name).unwrap();
    assert_eq!(view.dtype(), Dtype::F32, "{} is not f32", name);
    let data: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    (view.shape().to_vec(), data)
}

/// Names of all tensors in a safetensors file.
pub fn tensor_names(path: &Path) -> Vec<String> {
    let bytes = std::fs::read(path).unwrap();
    let st = safetensors::SafeTensors::deserialize(&bytes).unwrap();
    let mut names: Vec<String> = st.names().into_iter().cloned().collect();
    names.sort();
    names
}

pub const HIDDEN: usize = 4;

/// Donor with tokens `<unk> </s> hello world foo bar`, no BOS, separate head.
pub fn write_donor(dir: &Path) {
    write_tokenizer(dir, &["<unk>", "</s>", "hello", "world", "foo", "bar"]);
    write_json(
        &dir.join("tokenizer_config.json"),
        &json!({"eos_token": "</s>", "add_bos_token": false}),
    );
    write_json(
        &dir.join("config.json"),
        &json!({
            "architectures": ["LlamaForCausalLM"],
            "hidden_size": HIDDEN,
            "vocab_size": 6,
            "eos_token_id": 1,
            "tie_word_embeddings": false,
            "torch_dtype": "float32"
        }),
    );
    write_safetensors(
        &dir.join("model.safetensors"),
        &[
            ("model.embed_tokens.weight", matrix(6, HIDDEN, 0.0), vec![6, HIDDEN]),
            ("lm_head.weight", matrix(6, HIDDEN, 100.0), vec![6, HIDDEN]),
            ("model.norm.weight", vec![1.0; HIDDEN], vec![HIDDEN]),
        ],
    );
}

/// Target with tokens `<unk> <|end|> hello world "hello world" foo`, declared
/// size 8, a BOS-using chat template.
pub fn write_target(dir: &Path) {
    write_tokenizer(
        dir,
        &["<unk>", "<|end|>", "hello", "world", "hello world", "foo"],
    );
    write_json(
        &dir.join("tokenizer_config.json"),
        &json!({
            "eos_token": "<|end|>",
            "add_bos_token": true,
            "chat_template": "{{ bos_token }}{% for m in messages %}{{ m.content }}{% endfor %}"
        }),
    );
    write_json(
        &dir.join("config.json"),
        &json!({"hidden_size": 16, "vocab_size": 8}),
    );
}
