//! Field rules for tabs, groups and notes.

use crate::error::{TreeError, TreeResult};
use crate::model::{NodeSpec, NodeUpdate};
use crate::settings::Settings;

pub fn validate_title(title: &str, settings: &Settings) -> TreeResult<()> {
    if title.trim().is_empty() {
        return Err(TreeError::invalid("title must not be blank"));
    }
    let len = title.chars().count();
    if len > settings.title_max_len {
        return Err(TreeError::invalid(format!(
            "title is {len} characters, the limit is {}",
            settings.title_max_len
        )));
    }
    Ok(())
}

pub fn validate_url(url: &str, settings: &Settings) -> TreeResult<()> {
    if url.trim().is_empty() {
        return Err(TreeError::invalid("url must not be blank"));
    }
    if !settings.require_http_url {
        return Ok(());
    }
    let parsed = url::Url::parse(url)
        .map_err(|err| TreeError::invalid(format!("url {url:?} is malformed: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(TreeError::invalid(format!(
            "url {url:?} must be an http or https address"
        )));
    }
    Ok(())
}

pub fn validate_update(update: &NodeUpdate, settings: &Settings) -> TreeResult<()> {
    if update.is_empty() {
        return Err(TreeError::invalid("update changes nothing"));
    }
    if let Some(title) = &update.title {
        validate_title(title, settings)?;
    }
    if let Some(url) = &update.url {
        validate_url(url, settings)?;
    }
    Ok(())
}

pub fn validate_group_name(name: &str, settings: &Settings) -> TreeResult<()> {
    if name.trim().is_empty() {
        return Err(TreeError::invalid("group name must not be blank"));
    }
    if name.chars().count() > settings.group_name_max_len {
        return Err(TreeError::invalid(format!(
            "group name exceeds {} characters",
            settings.group_name_max_len
        )));
    }
    Ok(())
}

pub fn validate_content(text: &str) -> TreeResult<()> {
    if text.trim().is_empty() {
        return Err(TreeError::invalid("content must not be blank"));
    }
    Ok(())
}

/// Checks every entry of a bulk batch.
///
/// The error names the batch size and the dotted path of the first bad
/// entry (`"2.1"` is the first child of the second top-level spec).
pub fn validate_specs(specs: &[NodeSpec], settings: &Settings) -> TreeResult<()> {
    if specs.is_empty() {
        return Err(TreeError::invalid("bulk batch is empty"));
    }
    let total: usize = specs.iter().map(NodeSpec::count).sum();
    check_level(specs, "", settings).map_err(|(path, err)| {
        let reason = match err {
            TreeError::ValidationFailed { reason } => reason,
            other => other.to_string(),
        };
        TreeError::invalid(format!(
            "bulk batch of {total} tabs rejected: entry {path}: {reason}"
        ))
    })
}

fn check_level(
    specs: &[NodeSpec],
    prefix: &str,
    settings: &Settings,
) -> Result<(), (String, TreeError)> {
    for (i, spec) in specs.iter().enumerate() {
        let path = if prefix.is_empty() {
            (i + 1).to_string()
        } else {
            format!("{prefix}.{}", i + 1)
        };
        validate_title(&spec.title, settings).map_err(|e| (path.clone(), e))?;
        validate_url(&spec.url, settings).map_err(|e| (path.clone(), e))?;
        check_level(&spec.children, &path, settings)?;
    }
    Ok(())
}
