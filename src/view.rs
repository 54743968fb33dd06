use crate::error::LookupError;
use crate::geometry::{bounds_of, dataset_bounds, outer_ring_centroid, SpatialIndex};
use crate::selection::SelectionState;
use crate::style::{FeatureState, Style, StyleFn};
use crate::types::{GeoDataset, LayerHandle, ViewRole};
use geo::{Coord, MultiPolygon, Rect};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Jump,
    Animate,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub handle: LayerHandle,
    pub geoid: String,
    pub geometry: MultiPolygon<f64>,
    pub style: Style,
}

pub trait MapView: Send {
    /// Draws `layers` into `container`, replacing anything drawn before.
    fn mount(&mut self, container: &str, layers: Vec<Layer>);

    fn unmount(&mut self);

    fn set_style(&mut self, handle: LayerHandle, style: Style);

    fn bring_to_front(&mut self, handle: LayerHandle);

    fn fit_bounds(&mut self, bounds: Rect<f64>);

    fn set_view(&mut self, center: Coord<f64>, zoom: f64);

    fn pan_to(&mut self, center: Coord<f64>, transition: Transition);

    /// User clicks received since the last call, oldest first.
    fn drain_clicks(&mut self) -> Vec<LayerHandle>;

    fn layer_count(&self) -> usize;
}

pub type ClickHandler = Box<dyn FnMut(&str) + Send>;

struct Mounted {
    dataset: Arc<GeoDataset>,
    style: StyleFn,
}

pub struct ViewRenderer<M> {
    role: ViewRole,
    container: String,
    map: M,
    mounted: Option<Mounted>,
    neighbors: BTreeSet<String>,
    click_handlers: Vec<ClickHandler>,
}

impl<M: MapView> ViewRenderer<M> {
    pub fn new(role: ViewRole, container: impl Into<String>, map: M) -> Self {
        Self {
            role,
            container: container.into(),
            map,
            mounted: None,
            neighbors: BTreeSet::new(),
            click_handlers: Vec::new(),
        }
    }

    pub fn role(&self) -> ViewRole {
        self.role
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn dataset(&self) -> Option<&Arc<GeoDataset>> {
        self.mounted.as_ref().map(|m| &m.dataset)
    }

    /// Identifiers drawn with the neighbor style, sorted.
    pub fn neighbors(&self) -> impl Iterator<Item = &str> {
        self.neighbors.iter().map(String::as_str)
    }

    /// Draws `dataset` with base styling. A second mount tears the first down.
    pub fn mount(&mut self, dataset: Arc<GeoDataset>, style: StyleFn) {
        if self.mounted.is_some() {
            self.map.unmount();
        }

        let layers = dataset
            .features()
            .iter()
            .enumerate()
            .map(|(i, feature)| Layer {
                handle: LayerHandle(i),
                geoid: feature.id.clone(),
                geometry: feature.geometry.clone(),
                style: style(feature, FeatureState::default()),
            })
            .collect();
        self.map.mount(&self.container, layers);
        self.mounted = Some(Mounted { dataset, style });
    }

    pub fn unmount(&mut self) {
        if self.mounted.take().is_some() {
            self.map.unmount();
        }
        self.neighbors.clear();
    }

    pub fn fit_to_dataset(&mut self) {
        if let Some(bounds) = self.dataset().and_then(|d| dataset_bounds(d)) {
            self.map.fit_bounds(bounds);
        }
    }

    /// Restyles every feature against `selection`; returns highlighted handles.
    pub fn render(&mut self, selection: &SelectionState) -> Vec<LayerHandle> {
        let Some(mounted) = &self.mounted else {
            return Vec::new();
        };

        let mut highlighted = Vec::new();
        let mut front = None;
        for (i, feature) in mounted.dataset.features().iter().enumerate() {
            let handle = LayerHandle(i);
            let state = FeatureState {
                selected: selection.is_selected(&feature.id),
                neighbor: self.neighbors.contains(&feature.id),
            };
            self.map.set_style(handle, (mounted.style)(feature, state));
            if state.selected {
                front = Some(handle);
            }
            if state.selected || state.neighbor {
                highlighted.push(handle);
            }
        }
        if let Some(handle) = front {
            self.map.bring_to_front(handle);
        }
        highlighted
    }

    pub fn on_feature_click<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.click_handlers.push(Box::new(handler));
    }

    /// Resolves a user click to its identifier and notifies handlers once.
    pub fn handle_click(&mut self, handle: LayerHandle) -> Option<String> {
        let geoid = self
            .mounted
            .as_ref()?
            .dataset
            .features()
            .get(handle.0)?
            .id
            .clone();
        for handler in &mut self.click_handlers {
            handler(&geoid);
        }
        Some(geoid)
    }

    pub fn handle_for(&self, geoid: &str) -> Option<LayerHandle> {
        self.mounted
            .as_ref()?
            .dataset
            .position(geoid)
            .map(LayerHandle)
    }

    /// Centers on the selected feature's centroid.
    ///
    /// The first call mounts the view and jumps straight to the centroid at
    /// `zoom`; later calls pan the existing viewport there.
    pub fn show_detail(
        &mut self,
        dataset: &Arc<GeoDataset>,
        style: &StyleFn,
        selection: &SelectionState,
        zoom: f64,
    ) -> Result<Vec<LayerHandle>, LookupError> {
        let geoid = selection.selected().ok_or(LookupError::NoSelection)?;
        let feature = dataset
            .get(geoid)
            .ok_or_else(|| LookupError::UnknownIdentifier {
                geoid: geoid.to_string(),
                dataset: dataset.kind(),
            })?;
        let center = outer_ring_centroid(&feature.geometry)
            .ok_or_else(|| LookupError::EmptyGeometry(geoid.to_string()))?;

        let same_dataset = self
            .dataset()
            .is_some_and(|mounted| Arc::ptr_eq(mounted, dataset));
        if same_dataset {
            self.map.pan_to(center, Transition::Animate);
        } else {
            self.mount(Arc::clone(dataset), Arc::clone(style));
            self.map.set_view(center, zoom);
        }
        Ok(self.render(selection))
    }

    /// Draws the selected feature and every feature touching it, fitted to
    /// their combined bounds.
    pub fn show_neighbors(
        &mut self,
        dataset: &GeoDataset,
        index: &SpatialIndex,
        style: &StyleFn,
        selection: &SelectionState,
    ) -> Result<Vec<LayerHandle>, LookupError> {
        let geoid = selection.selected().ok_or(LookupError::NoSelection)?;
        let position = dataset
            .position(geoid)
            .ok_or_else(|| LookupError::UnknownIdentifier {
                geoid: geoid.to_string(),
                dataset: dataset.kind(),
            })?;

        let mut positions = vec![position];
        positions.extend(index.neighbors(dataset, position));
        let subset = Arc::new(dataset.subset(&positions));
        let bounds = bounds_of(subset.features().iter().map(|f| &f.geometry));

        self.neighbors = subset
            .features()
            .iter()
            .skip(1)
            .map(|f| f.id.clone())
            .collect();
        debug!(geoid = geoid, neighbors = self.neighbors.len(), "Neighbor set computed");

        self.mount(subset, Arc::clone(style));
        match bounds {
            Some(bounds) => self.map.fit_bounds(bounds),
            None => debug!(geoid = geoid, "Selected geometry is empty; viewport left as is"),
        }
        Ok(self.render(selection))
    }
}
