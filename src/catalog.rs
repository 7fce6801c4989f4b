//! Read-only catalog of purchasable designs, loaded once at startup.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::models::{Design, is_money};

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    designs: Vec<Design>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    designs: BTreeMap<String, Design>,
}

impl Catalog {
    /// Read and validate the catalog document at `path`.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(designs = catalog.len(), path = %path.display(), "catalog loaded");
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let document: CatalogDocument =
            serde_json::from_str(raw).context("parsing catalog document")?;
        Self::from_designs(document.designs)
    }

    pub fn from_designs(designs: Vec<Design>) -> anyhow::Result<Self> {
        let mut by_id = BTreeMap::new();
        for design in designs {
            let design = normalize(design)?;
            if by_id.contains_key(&design.id) {
                bail!("duplicate design id {}", design.id);
            }
            by_id.insert(design.id.clone(), design);
        }
        Ok(Self { designs: by_id })
    }

    pub fn get(&self, design_id: &str) -> Option<&Design> {
        self.designs.get(design_id)
    }

    /// Relative asset path for one purchased format, if the catalog knows it.
    pub fn asset_path(&self, design_id: &str, format: &str) -> Option<&str> {
        self.get(design_id)?
            .asset_paths
            .get(format)
            .map(String::as_str)
    }

    pub fn designs(&self) -> impl Iterator<Item = &Design> {
        self.designs.values()
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }
}

fn normalize(mut design: Design) -> anyhow::Result<Design> {
    design.id = design.id.trim().to_string();
    if design.id.is_empty() {
        bail!("design with empty id");
    }
    if !is_money(design.price) {
        bail!("design {} has invalid price {}", design.id, design.price);
    }
    design.formats = design
        .formats
        .into_iter()
        .map(|f| f.trim().to_ascii_uppercase())
        .collect();
    design.asset_paths = design
        .asset_paths
        .into_iter()
        .map(|(format, path)| (format.trim().to_ascii_uppercase(), path))
        .collect();
    if let Some(format) = design
        .asset_paths
        .keys()
        .find(|format| !design.formats.contains(*format))
    {
        bail!("design {} has an asset for unoffered format {format}", design.id);
    }
    Ok(design)
}
