//! Human-readable unique keys (`unique_name`) and generated display names.

use tracing::debug;
use uuid::Uuid;

use inventory_common::{InventoryError, Result};

use crate::reader::EntryReader;
use crate::value::slugify;

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Appends a random suffix to a taken key.
pub fn disambiguate(base: &str) -> String {
    format!("{base}_{}", random_suffix())
}

fn base_name(name: &str) -> Result<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(InventoryError::invalid(
            "name",
            name,
            "cannot derive a unique name",
        ));
    }
    Ok(slug)
}

async fn is_taken(reader: &EntryReader, candidate: &str) -> Result<bool> {
    Ok(reader.get_uid("unique_name", candidate).await?.is_some())
}

/// Slug of `name`, suffixed when already in use.
pub async fn unique_name(reader: &EntryReader, name: &str) -> Result<String> {
    let base = base_name(name)?;
    if !is_taken(reader, &base).await? {
        return Ok(base);
    }
    let name = disambiguate(&base);
    debug!(base = %base, unique_name = %name, "Unique name taken, added suffix");
    Ok(name)
}

/// Sources try `name`, `name_channel`, `name_country_channel` before
/// falling back to a random suffix.
pub async fn source_unique_name(
    reader: &EntryReader,
    name: &str,
    channel: Option<&str>,
    country: Option<&str>,
) -> Result<String> {
    let base = base_name(name)?;
    let mut candidates = vec![base.clone()];
    if let Some(channel) = channel {
        candidates.push(slugify(&format!("{base} {channel}")));
        if let Some(country) = country {
            candidates.push(slugify(&format!("{base} {country} {channel}")));
        }
    }
    candidates.dedup();

    for candidate in &candidates {
        if !is_taken(reader, candidate).await? {
            return Ok(candidate.clone());
        }
    }
    let last = candidates.last().cloned().unwrap_or(base);
    Ok(disambiguate(&last))
}

/// `"{first author}[ et al.] ({year}): {title}"`, with the title cut after
/// its first sentence.
pub fn research_paper_name(authors: &[String], year: Option<i32>, title: &str) -> String {
    let mut name = authors.first().cloned().unwrap_or_default();
    if authors.len() > 1 {
        name.push_str(" et al.");
    }
    if let Some(year) = year {
        name.push_str(&format!(" ({year})"));
    }
    let title = title.trim();
    let short = match title.find(['.', '?', '!']) {
        Some(i) if title[i..].starts_with('.') => &title[..i],
        Some(i) => &title[..=i],
        None => title,
    };
    if name.is_empty() {
        short.to_string()
    } else {
        format!("{}: {short}", name.trim())
    }
}

/// DOI or arXiv id as a key, when present.
pub fn research_paper_unique_name(doi: Option<&str>, arxiv: Option<&str>) -> Option<String> {
    doi.into_iter()
        .chain(arxiv)
        .map(slugify)
        .find(|s| !s.is_empty())
}
