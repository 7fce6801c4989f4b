use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Design, Shape};

/// Public view of a design. Asset locations stay server-side.
#[derive(Debug, Serialize, ToSchema)]
pub struct DesignView {
    pub id: String,
    pub artist: String,
    pub song: String,
    pub shape: Shape,
    pub price: Decimal,
    pub formats: BTreeSet<String>,
}

impl From<&Design> for DesignView {
    fn from(design: &Design) -> Self {
        Self {
            id: design.id.clone(),
            artist: design.artist.clone(),
            song: design.song.clone(),
            shape: design.shape,
            price: design.price,
            formats: design.formats.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DesignList {
    pub items: Vec<DesignView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionIssued {
    pub session_id: String,
}
