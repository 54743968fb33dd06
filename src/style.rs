//! Polygon styling for each view. Every fill and border decision is made here.

use crate::scale::{Color, ColorScale};
use crate::types::{canonical_key, GeoFeature, IndicatorRange, ViewRole};
use serde::Serialize;
use std::sync::Arc;

pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
pub const GREY: Color = Color::rgb(0x66, 0x66, 0x66);
pub const RED: Color = Color::rgb(0xe3, 0x1a, 0x1c);
pub const YELLOW: Color = Color::rgb(0xff, 0xff, 0x00);
/// Fixed tint for neighbor polygons.
pub const NEIGHBOR: Color = Color::rgb(0xfd, 0x8d, 0x3c);
/// Fill for features without a numeric indicator value.
pub const NO_DATA: Color = Color::rgb(0xcc, 0xcc, 0xcc);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Style {
    pub color: Color,
    pub fill_color: Color,
    pub weight: f64,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureState {
    pub selected: bool,
    pub neighbor: bool,
}

pub type StyleFn = Arc<dyn Fn(&GeoFeature, FeatureState) -> Style + Send + Sync>;

/// Builds the style function of `role` for one indicator and its range.
pub fn for_view(role: ViewRole, indicator: &str, range: &IndicatorRange) -> StyleFn {
    let key = canonical_key(indicator);
    let scale = ColorScale::new(range);

    Arc::new(move |feature: &GeoFeature, state: FeatureState| {
        let fill = feature
            .numeric(&key)
            .map(|v| scale.color_for(v))
            .unwrap_or(NO_DATA);
        style_for(role, fill, state)
    })
}

fn style_for(role: ViewRole, fill: Color, state: FeatureState) -> Style {
    match (role, state.selected, state.neighbor) {
        (ViewRole::Hex, true, _) => Style {
            color: RED,
            fill_color: YELLOW,
            weight: 0.5,
            fill_opacity: 0.7,
        },
        (ViewRole::Hex, false, _) => Style {
            color: WHITE,
            fill_color: fill,
            weight: 0.3,
            fill_opacity: 0.7,
        },
        (ViewRole::Choropleth, true, _) => Style {
            color: GREY,
            fill_color: fill,
            weight: 5.0,
            fill_opacity: 0.7,
        },
        (ViewRole::Choropleth, false, _) => Style {
            color: WHITE,
            fill_color: fill,
            weight: 2.0,
            fill_opacity: 0.5,
        },
        (ViewRole::Detail | ViewRole::Neighbors, true, _) => Style {
            color: GREY,
            fill_color: fill,
            weight: 4.0,
            fill_opacity: 0.8,
        },
        (ViewRole::Neighbors, false, true) => Style {
            color: WHITE,
            fill_color: NEIGHBOR,
            weight: 2.0,
            fill_opacity: 0.6,
        },
        (ViewRole::Detail | ViewRole::Neighbors, false, _) => Style {
            color: WHITE,
            fill_color: fill,
            weight: 1.0,
            fill_opacity: 0.4,
        },
    }
}
