use crate::types::{canonical_key, GeoFeature};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    TwoColumn,
    /// Two key/value pairs per row.
    Paired,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyTable {
    pub rows: Vec<PropertyRow>,
}

impl PropertyTable {
    pub fn for_feature(feature: &GeoFeature, id_field: &str) -> Self {
        let id_field = canonical_key(id_field);
        let mut rows = vec![PropertyRow {
            key: id_field.clone(),
            value: feature.id.clone(),
        }];
        rows.extend(
            feature
                .properties
                .iter()
                .filter(|(k, _)| **k != id_field)
                .map(|(k, v)| PropertyRow {
                    key: k.clone(),
                    value: v.to_string(),
                }),
        );
        Self { rows }
    }

    pub fn paired_rows(&self) -> Vec<[Option<&PropertyRow>; 2]> {
        self.rows
            .chunks(2)
            .map(|pair| [pair.first(), pair.get(1)])
            .collect()
    }

    /// Cell text laid out per `layout`; short final rows are padded with "".
    pub fn cells(&self, layout: Layout) -> Vec<Vec<String>> {
        match layout {
            Layout::TwoColumn => self
                .rows
                .iter()
                .map(|row| vec![row.key.clone(), row.value.clone()])
                .collect(),
            Layout::Paired => self
                .paired_rows()
                .into_iter()
                .map(|pair| {
                    pair.iter()
                        .flat_map(|row| match row {
                            Some(row) => [row.key.clone(), row.value.clone()],
                            None => [String::new(), String::new()],
                        })
                        .collect()
                })
                .collect(),
        }
    }
}
