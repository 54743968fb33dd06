//! In-memory map backend. Records what a real map library would draw so the
//! dashboard can run without a browser: in tests, behind the HTTP API, and
//! as input to the PNG rasterizer.

use crate::style::Style;
use crate::types::LayerHandle;
use crate::view::{Layer, MapView, Transition};
use geo::{Coord, Rect};
use serde::Serialize;
use std::collections::HashMap;

pub const MAX_ZOOM: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    /// [lon, lat]
    pub center: [f64; 2],
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneLayer {
    pub handle: LayerHandle,
    pub geoid: String,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub container: Option<String>,
    pub layers: Vec<SceneLayer>,
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Default)]
pub struct HeadlessMap {
    container: Option<String>,
    layers: HashMap<LayerHandle, Layer>,
    // Bottom to top.
    order: Vec<LayerHandle>,
    viewport: Option<Viewport>,
    bounds: Option<Rect<f64>>,
    last_transition: Option<Transition>,
    pending_clicks: Vec<LayerHandle>,
}

/// Zoom at which `span` degrees fill a 256px tile.
pub fn zoom_for_span(span: f64) -> f64 {
    if span <= 0.0 || !span.is_finite() {
        return MAX_ZOOM;
    }
    (360.0 / span).log2().clamp(0.0, MAX_ZOOM)
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a user click; ignored for handles that are not drawn.
    pub fn click(&mut self, handle: LayerHandle) {
        if self.layers.contains_key(&handle) {
            self.pending_clicks.push(handle);
        }
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Last bounds passed to `fit_bounds`, as ([min x, min y], [max x, max y]).
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        self.bounds
            .map(|r| ([r.min().x, r.min().y], [r.max().x, r.max().y]))
    }

    /// How the viewport last moved; reset by `unmount`.
    pub fn last_transition(&self) -> Option<Transition> {
        self.last_transition
    }

    pub fn layer(&self, handle: LayerHandle) -> Option<&Layer> {
        self.layers.get(&handle)
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.order.iter().filter_map(|h| self.layers.get(h))
    }

    pub fn scene(&self) -> Scene {
        Scene {
            container: self.container.clone(),
            layers: self
                .layers()
                .map(|layer| SceneLayer {
                    handle: layer.handle,
                    geoid: layer.geoid.clone(),
                    style: layer.style,
                })
                .collect(),
            viewport: self.viewport,
        }
    }
}

impl MapView for HeadlessMap {
    fn mount(&mut self, container: &str, layers: Vec<Layer>) {
        self.unmount();
        self.container = Some(container.to_string());
        for layer in layers {
            let handle = layer.handle;
            if self.layers.insert(handle, layer).is_none() {
                self.order.push(handle);
            }
        }
    }

    fn unmount(&mut self) {
        self.container = None;
        self.layers.clear();
        self.order.clear();
        self.viewport = None;
        self.bounds = None;
        self.last_transition = None;
        self.pending_clicks.clear();
    }

    fn set_style(&mut self, handle: LayerHandle, style: Style) {
        if let Some(layer) = self.layers.get_mut(&handle) {
            layer.style = style;
        }
    }

    fn bring_to_front(&mut self, handle: LayerHandle) {
        if let Some(at) = self.order.iter().position(|h| *h == handle) {
            let handle = self.order.remove(at);
            self.order.push(handle);
        }
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let center = bounds.center();
        let span = bounds.width().max(bounds.height());
        self.viewport = Some(Viewport {
            center: [center.x, center.y],
            zoom: zoom_for_span(span),
        });
        self.bounds = Some(bounds);
    }

    fn set_view(&mut self, center: Coord<f64>, zoom: f64) {
        self.viewport = Some(Viewport {
            center: [center.x, center.y],
            zoom: zoom.clamp(0.0, MAX_ZOOM),
        });
        self.last_transition = Some(Transition::Jump);
    }

    fn pan_to(&mut self, center: Coord<f64>, transition: Transition) {
        let zoom = self.viewport.map(|v| v.zoom).unwrap_or(0.0);
        // An animated pan ends exactly where a jump would.
        self.viewport = Some(Viewport {
            center: [center.x, center.y],
            zoom,
        });
        self.last_transition = Some(transition);
    }

    fn drain_clicks(&mut self) -> Vec<LayerHandle> {
        std::mem::take(&mut self.pending_clicks)
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
