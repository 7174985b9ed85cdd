// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command template substitution.
//!
//! Templates name their inputs with `{slot}` markers, e.g.
//! `moqui --gpu {gpu_id} --in {in_dir} --out {out_dir}`. Substitution is
//! strict: an unknown slot is an error rather than a silently-forwarded
//! literal, since the command would fail remotely in a far less
//! debuggable way. `{{` and `}}` escape literal braces.

/// The substitution slots available to every step template, with paths
/// composed under the configured upload/download directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub case_id: String,
    pub gpu_id: i64,
    pub rtplan_path: String,
    pub in_dir: String,
    pub out_dir: String,
    pub raw_file: String,
    pub output_path: String,
    pub dicom_file: String,
}

impl TemplateVars {
    /// Build the slot set for a case from the configured remote roots.
    pub fn for_case(case_id: &str, gpu_id: i64, upload_dir: &str, download_dir: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            gpu_id,
            rtplan_path: format!("{upload_dir}/{case_id}/rtplan.dcm"),
            in_dir: format!("{upload_dir}/{case_id}/input"),
            out_dir: format!("{download_dir}/{case_id}/output"),
            raw_file: format!("{download_dir}/{case_id}/output.raw"),
            output_path: format!("{download_dir}/{case_id}/processed"),
            dicom_file: format!("{download_dir}/{case_id}/output.dcm"),
        }
    }

    fn lookup(&self, slot: &str) -> Option<String> {
        match slot {
            "case_id" => Some(self.case_id.clone()),
            "gpu_id" => Some(self.gpu_id.to_string()),
            "rtplan_path" => Some(self.rtplan_path.clone()),
            "in_dir" => Some(self.in_dir.clone()),
            "out_dir" => Some(self.out_dir.clone()),
            "raw_file" => Some(self.raw_file.clone()),
            "output_path" => Some(self.output_path.clone()),
            "dicom_file" => Some(self.dicom_file.clone()),
            _ => None,
        }
    }
}

/// Render a template, substituting every `{slot}`. Returns the unknown
/// slot name on failure.
pub fn render_command(template: &str, vars: &TemplateVars) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let mut slot = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    slot.push(inner);
                }
                if !closed {
                    return Err(slot);
                }
                match vars.lookup(&slot) {
                    Some(value) => rendered.push_str(&value),
                    None => return Err(slot),
                }
            }
            _ => rendered.push(ch),
        }
    }
    Ok(rendered)
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
