//! Output directory handling and tokenizer file assembly.

use std::path::Path;

use crate::error::{TransplantError, TransplantResult};

/// Tokenizer files copied verbatim from the target, when present.
pub const TOKENIZER_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "vocab.json",
    "merges.txt",
    "tokenizer.model",
    "added_tokens.json",
    "chat_template.jinja",
];

/// Fail unless `path` is an existing directory.
pub fn require_dir(role: &'static str, path: &Path) -> TransplantResult<()> {
    if !path.is_dir() {
        return Err(TransplantError::DirectoryNotFound {
            role,
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Fail if the output exists and may not be replaced.
pub fn check_output_dir(path: &Path, overwrite: bool) -> TransplantResult<()> {
    if path.exists() && !overwrite {
        return Err(TransplantError::OutputExists {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Create a fresh output directory, removing an existing one if `overwrite`.
pub fn prepare_output_dir(path: &Path, overwrite: bool) -> TransplantResult<()> {
    check_output_dir(path, overwrite)?;
    if path.exists() {
        tracing::info!("Removing existing output directory {}", path.display());
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Copy the target's tokenizer files into `output_dir`.
///
/// Returns the names of the files copied.
pub fn copy_tokenizer_files(target_dir: &Path, output_dir: &Path) -> TransplantResult<Vec<String>> {
    let mut copied = Vec::new();
    for name in TOKENIZER_FILES {
        let source = target_dir.join(name);
        if source.is_file() {
            std::fs::copy(&source, output_dir.join(name))?;
            copied.push(name.to_string());
        }
    }
    tracing::info!("Copied tokenizer files: {}", copied.join(", "));
    Ok(copied)
}

/// Disable BOS insertion in `output_dir/tokenizer_config.json`.
///
/// Textual edit so the rest of the file is preserved byte for byte: turns
/// `"add_bos_token": true` off and strips `{{ bos_token }}` from the chat
/// template. Returns `false` when there is no config to patch.
pub fn patch_bos_handling(output_dir: &Path) -> TransplantResult<bool> {
    let path = output_dir.join("tokenizer_config.json");
    if !path.is_file() {
        return Ok(false);
    }

    tracing::info!("Patching BOS handling in '{}'", path.display());
    let text = std::fs::read_to_string(&path)?;
    let patched = patch_bos_text(&text);
    if patched != text {
        std::fs::write(&path, patched)?;
    }
    tracing::info!("- Updated 'add_bos_token' configuration.");
    tracing::info!("- Removed all references to 'bos_token' from Jinja chat template.");
    Ok(true)
}

fn patch_bos_text(text: &str) -> String {
    text.replace("\"add_bos_token\": true", "\"add_bos_token\": false")
        .replace("{{ bos_token }}", "")
        .replace("{{bos_token}}", "")
}
