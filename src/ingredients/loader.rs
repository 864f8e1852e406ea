//! Bulk import of the ingredient catalogue from a reference data file.
//!
//! Two formats are accepted, picked by file extension:
//! - `.csv`: one `name,unit` pair per line; the unit is taken after the last comma
//! - `.json`: `[{"name": "...", "measurement_unit": "..."}]`

use std::path::Path;

use anyhow::{bail, Context};
use sqlx::PgPool;
use tracing::{info, warn};

use super::repo::{self, NewIngredient};

const BATCH: usize = 1000;

pub fn parse_csv(content: &str) -> anyhow::Result<Vec<NewIngredient>> {
    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, unit)) = line.rsplit_once(',') else {
            bail!("line {}: expected `name,unit`", lineno + 1);
        };
        let (name, unit) = (unquote(name), unquote(unit));
        if name.is_empty() || unit.is_empty() {
            bail!("line {}: empty name or unit", lineno + 1);
        }
        out.push(NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        });
    }
    Ok(out)
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
        .trim()
}

pub fn parse_json(content: &str) -> anyhow::Result<Vec<NewIngredient>> {
    serde_json::from_str(content).context("parse ingredients json")
}

pub fn parse_file(path: &Path, content: &str) -> anyhow::Result<Vec<NewIngredient>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => parse_csv(content),
        Some(ext) if ext.eq_ignore_ascii_case("json") => parse_json(content),
        _ => bail!("unsupported file type {}: expected .csv or .json", path.display()),
    }
}

/// Read `path` and insert its ingredients, skipping ones already present.
pub async fn load_file(db: &PgPool, path: &Path) -> anyhow::Result<u64> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let items = parse_file(path, &content)?;
    if items.is_empty() {
        warn!(path = %path.display(), "no ingredients found");
        return Ok(0);
    }

    let mut inserted = 0;
    for chunk in items.chunks(BATCH) {
        inserted += repo::insert_many(db, chunk).await?;
    }
    info!(path = %path.display(), total = items.len(), inserted, "ingredients loaded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_takes_unit_after_last_comma() {
        let items = parse_csv("flour,g\n\n\"salt, sea\",pinch\r\neggs , pcs\n").unwrap();
        assert_eq!(
            items,
            vec![
                NewIngredient { name: "flour".into(), measurement_unit: "g".into() },
                NewIngredient { name: "salt, sea".into(), measurement_unit: "pinch".into() },
                NewIngredient { name: "eggs".into(), measurement_unit: "pcs".into() },
            ]
        );
    }

    #[test]
    fn csv_rejects_lines_without_unit() {
        let err = parse_csv("flour,g\nbutter\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn json_and_extension_dispatch() {
        let json = r#"[{"name": "milk", "measurement_unit": "ml"}]"#;
        let items = parse_file(Path::new("data/ingredients.json"), json).unwrap();
        assert_eq!(items[0].name, "milk");
        assert_eq!(items[0].measurement_unit, "ml");

        assert!(parse_file(Path::new("data/ingredients.xml"), "").is_err());
    }
}
