//! Selection coordination and the per-indicator load cycle.
//!
//! ```text
//! Idle -> Loading -> Rendered -> Selected
//!            ^                      |
//!            +---- indicator -------+
//! ```
//!
//! Every indicator change bumps a generation counter. A fetch that completes
//! for an older generation is dropped, so a slow superseded response never
//! overwrites newer state. Clicks are ignored until both datasets of the
//! current generation are rendered.

use crate::config::{AppConfig, SourceConfig};
use crate::data::{compute_range, Fetch, GeoLoader};
use crate::error::{DashboardError, LoadError, LookupError};
use crate::geometry::SpatialIndex;
use crate::scale::Legend;
use crate::selection::SelectionState;
use crate::style::{self, StyleFn};
use crate::table::PropertyTable;
use crate::types::{
    canonical_key, DatasetKind, GeoDataset, GeoFeature, IndicatorRange, LayerHandle, ViewRole,
};
use crate::view::{MapView, ViewRenderer};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    LoadFailed,
    Rendered,
    Selected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[default]
    Empty,
    Loading,
    Rendered,
    Failed,
}

#[derive(Debug, Default)]
pub struct DatasetSlot {
    status: SlotStatus,
    dataset: Option<Arc<GeoDataset>>,
    range: Option<IndicatorRange>,
}

impl DatasetSlot {
    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn dataset(&self) -> Option<&Arc<GeoDataset>> {
        self.dataset.as_ref()
    }

    pub fn range(&self) -> Option<IndicatorRange> {
        self.range
    }
}

#[derive(Default)]
pub struct DashboardState {
    indicator: Option<String>,
    generation: u64,
    selection: SelectionState,
    hex: DatasetSlot,
    tract: DatasetSlot,
    tract_index: Option<SpatialIndex>,
    styles: BTreeMap<ViewRole, StyleFn>,
}

impl DashboardState {
    pub fn indicator(&self) -> Option<&str> {
        self.indicator.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn slot(&self, kind: DatasetKind) -> &DatasetSlot {
        match kind {
            DatasetKind::Hex => &self.hex,
            DatasetKind::Tract => &self.tract,
        }
    }

    fn slot_mut(&mut self, kind: DatasetKind) -> &mut DatasetSlot {
        match kind {
            DatasetKind::Hex => &mut self.hex,
            DatasetKind::Tract => &mut self.tract,
        }
    }

    pub fn phase(&self) -> Phase {
        let statuses = [self.hex.status, self.tract.status];
        if self.indicator.is_none() {
            Phase::Idle
        } else if statuses.contains(&SlotStatus::Loading) {
            Phase::Loading
        } else if statuses.contains(&SlotStatus::Failed) {
            Phase::LoadFailed
        } else if self.selection.selected().is_some() {
            Phase::Selected
        } else {
            Phase::Rendered
        }
    }

    pub fn accepts_clicks(&self) -> bool {
        self.hex.status == SlotStatus::Rendered && self.tract.status == SlotStatus::Rendered
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub generation: u64,
    pub indicator: String,
    pub hex: SourceConfig,
    pub tract: SourceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    Applied,
    Stale,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// Datasets not both rendered yet.
    Ignored,
    /// The clicked identifier is not drawn in that view.
    NotInView,
    /// Selection applied; `skipped` views kept their previous rendering.
    Selected {
        geoid: String,
        skipped: Vec<ViewRole>,
    },
}

struct Views<M> {
    hex: ViewRenderer<M>,
    choropleth: ViewRenderer<M>,
    detail: ViewRenderer<M>,
    neighbors: ViewRenderer<M>,
}

impl<M: MapView> Views<M> {
    fn get(&self, role: ViewRole) -> &ViewRenderer<M> {
        match role {
            ViewRole::Hex => &self.hex,
            ViewRole::Choropleth => &self.choropleth,
            ViewRole::Detail => &self.detail,
            ViewRole::Neighbors => &self.neighbors,
        }
    }

    fn get_mut(&mut self, role: ViewRole) -> &mut ViewRenderer<M> {
        match role {
            ViewRole::Hex => &mut self.hex,
            ViewRole::Choropleth => &mut self.choropleth,
            ViewRole::Detail => &mut self.detail,
            ViewRole::Neighbors => &mut self.neighbors,
        }
    }
}

pub struct Dashboard<M> {
    config: AppConfig,
    state: DashboardState,
    views: Views<M>,
    // Filled by every view's click handler, drained by the fan-out.
    clicked: Arc<Mutex<Vec<String>>>,
}

pub type SharedDashboard<M> = Arc<Mutex<Dashboard<M>>>;

impl<M: MapView> Dashboard<M> {
    pub fn new<F>(config: AppConfig, mut make_map: F) -> Self
    where
        F: FnMut(ViewRole) -> M,
    {
        let mut views = Views {
            hex: ViewRenderer::new(ViewRole::Hex, &config.views.hex, make_map(ViewRole::Hex)),
            choropleth: ViewRenderer::new(
                ViewRole::Choropleth,
                &config.views.choropleth,
                make_map(ViewRole::Choropleth),
            ),
            detail: ViewRenderer::new(
                ViewRole::Detail,
                &config.views.detail,
                make_map(ViewRole::Detail),
            ),
            neighbors: ViewRenderer::new(
                ViewRole::Neighbors,
                &config.views.neighbors,
                make_map(ViewRole::Neighbors),
            ),
        };

        let clicked = Arc::new(Mutex::new(Vec::new()));
        for role in ViewRole::ALL {
            let sink = Arc::clone(&clicked);
            views
                .get_mut(role)
                .on_feature_click(move |geoid| sink.lock().push(geoid.to_string()));
        }

        Self {
            config,
            state: DashboardState::default(),
            views,
            clicked,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn view(&self, role: ViewRole) -> &ViewRenderer<M> {
        self.views.get(role)
    }

    pub fn view_mut(&mut self, role: ViewRole) -> &mut ViewRenderer<M> {
        self.views.get_mut(role)
    }

    /// Starts a new load cycle: tears down the detail and neighbor views,
    /// clears the selection and hands back what to fetch.
    pub fn begin_indicator_change(&mut self, key: &str) -> Result<LoadRequest, DashboardError> {
        let indicator = self
            .config
            .indicator(key)
            .ok_or_else(|| DashboardError::UnknownIndicator(key.to_string()))?;
        let request = LoadRequest {
            generation: self.state.generation + 1,
            indicator: canonical_key(&indicator.key),
            hex: indicator.hex.clone(),
            tract: indicator.tract.clone(),
        };

        self.state.generation = request.generation;
        self.state.indicator = Some(request.indicator.clone());
        self.state.selection.clear();
        self.state.hex.status = SlotStatus::Loading;
        self.state.tract.status = SlotStatus::Loading;

        self.views.detail.unmount();
        self.views.neighbors.unmount();
        // Overviews keep their polygons until new data arrives, minus the highlight.
        self.views.hex.render(&self.state.selection);
        self.views.choropleth.render(&self.state.selection);

        info!(
            indicator = %request.indicator,
            generation = request.generation,
            "Indicator changed"
        );
        Ok(request)
    }

    /// Applies one finished fetch if it still belongs to the current generation.
    pub fn complete_load(
        &mut self,
        generation: u64,
        kind: DatasetKind,
        result: Result<GeoDataset, LoadError>,
    ) -> LoadOutcome {
        if generation != self.state.generation {
            debug!(
                kind = %kind,
                generation,
                current = self.state.generation,
                "Discarding superseded dataset"
            );
            return LoadOutcome::Stale;
        }
        let Some(indicator) = self.state.indicator.clone() else {
            return LoadOutcome::Stale;
        };

        let dataset = match result {
            Ok(dataset) => Arc::new(dataset),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Dataset load failed; keeping previous rendering");
                self.state.slot_mut(kind).status = SlotStatus::Failed;
                return LoadOutcome::Failed;
            }
        };

        let range = compute_range(&dataset, &indicator);
        if range.is_degenerate() {
            warn!(kind = %kind, indicator = %indicator, "No numeric values for indicator");
        }

        match kind {
            DatasetKind::Hex => {
                let hex_style = style::for_view(ViewRole::Hex, &indicator, &range);
                self.state.styles.insert(ViewRole::Hex, Arc::clone(&hex_style));
                self.views.hex.mount(Arc::clone(&dataset), hex_style);
                self.views.hex.fit_to_dataset();
                self.views.hex.render(&self.state.selection);
            }
            DatasetKind::Tract => {
                for role in [ViewRole::Choropleth, ViewRole::Detail, ViewRole::Neighbors] {
                    self.state
                        .styles
                        .insert(role, style::for_view(role, &indicator, &range));
                }
                if let Some(choropleth_style) = self.state.styles.get(&ViewRole::Choropleth) {
                    self.views
                        .choropleth
                        .mount(Arc::clone(&dataset), Arc::clone(choropleth_style));
                }
                self.views.choropleth.fit_to_dataset();
                self.views.choropleth.render(&self.state.selection);
                self.state.tract_index = Some(SpatialIndex::build(&dataset));
            }
        }

        info!(
            kind = %kind,
            features = dataset.len(),
            min = range.min,
            max = range.max,
            "Dataset rendered"
        );
        *self.state.slot_mut(kind) = DatasetSlot {
            status: SlotStatus::Rendered,
            dataset: Some(dataset),
            range: Some(range),
        };
        LoadOutcome::Applied
    }

    /// Selects `geoid` and fans it out to all four views.
    ///
    /// A view that cannot show the identifier logs a diagnostic and keeps
    /// its previous rendering. Re-selecting the same identifier yields the
    /// same rendered state.
    pub fn on_any_view_clicked(&mut self, geoid: &str) -> ClickOutcome {
        if !self.state.accepts_clicks() {
            debug!(geoid = geoid, phase = ?self.state.phase(), "Click ignored until both datasets are rendered");
            return ClickOutcome::Ignored;
        }

        self.state.selection.select(geoid);

        let mut results: Vec<(ViewRole, Result<Vec<LayerHandle>, LookupError>)> =
            Vec::with_capacity(ViewRole::ALL.len());
        for role in ViewRole::ALL {
            let result = self.render_selection(role);
            results.push((role, result));
        }

        let mut skipped = Vec::new();
        for (role, result) in results {
            match result {
                Ok(handles) => self.state.selection.replace_highlights(role, handles),
                Err(e) => {
                    warn!(view = %role, error = %e, "Selection not shown in view");
                    skipped.push(role);
                }
            }
        }

        info!(geoid = geoid, skipped = skipped.len(), "Selection applied");
        ClickOutcome::Selected {
            geoid: geoid.to_string(),
            skipped,
        }
    }

    fn render_selection(&mut self, role: ViewRole) -> Result<Vec<LayerHandle>, LookupError> {
        let selection = &self.state.selection;
        let geoid = selection.selected().ok_or(LookupError::NoSelection)?;
        let style = self
            .state
            .styles
            .get(&role)
            .ok_or(LookupError::NotMounted(role))?;
        let tract = self
            .state
            .tract
            .dataset
            .as_ref()
            .ok_or(LookupError::NotMounted(role))?;

        match role {
            ViewRole::Hex | ViewRole::Choropleth => {
                let view = self.views.get_mut(role);
                let dataset = view.dataset().ok_or(LookupError::NotMounted(role))?;
                if !dataset.contains(geoid) {
                    return Err(LookupError::UnknownIdentifier {
                        geoid: geoid.to_string(),
                        dataset: dataset.kind(),
                    });
                }
                Ok(view.render(selection))
            }
            ViewRole::Detail => {
                self.views
                    .detail
                    .show_detail(tract, style, selection, self.config.views.detail_zoom)
            }
            ViewRole::Neighbors => {
                let index = self
                    .state
                    .tract_index
                    .as_ref()
                    .ok_or(LookupError::NotMounted(role))?;
                self.views
                    .neighbors
                    .show_neighbors(tract, index, style, selection)
            }
        }
    }

    /// Clicks on a feature drawn in `role`, as if the user had.
    pub fn click_feature(&mut self, role: ViewRole, geoid: &str) -> ClickOutcome {
        let view = self.views.get_mut(role);
        let Some(handle) = view.handle_for(geoid) else {
            debug!(view = %role, geoid = geoid, "Clicked identifier is not drawn in view");
            return ClickOutcome::NotInView;
        };
        view.handle_click(handle);
        self.dispatch_clicked()
            .pop()
            .unwrap_or(ClickOutcome::NotInView)
    }

    /// Dispatches every click the map backends have queued.
    pub fn process_clicks(&mut self) -> Vec<ClickOutcome> {
        for role in ViewRole::ALL {
            let view = self.views.get_mut(role);
            let handles = view.map_mut().drain_clicks();
            for handle in handles {
                view.handle_click(handle);
            }
        }
        self.dispatch_clicked()
    }

    fn dispatch_clicked(&mut self) -> Vec<ClickOutcome> {
        let clicked = std::mem::take(&mut *self.clicked.lock());
        clicked
            .iter()
            .map(|geoid| self.on_any_view_clicked(geoid))
            .collect()
    }

    /// Gradient legend for a dataset; `None` while loading or when the
    /// indicator has no numeric values.
    pub fn legend(&self, kind: DatasetKind) -> Option<Legend> {
        let range = self.state.slot(kind).range?;
        match Legend::new(&range, self.config.legend.stops) {
            Ok(legend) => Some(legend),
            Err(e) => {
                debug!(kind = %kind, "{}", e);
                None
            }
        }
    }

    pub fn selected_feature(&self) -> Option<&GeoFeature> {
        let geoid = self.state.selection.selected()?;
        [DatasetKind::Tract, DatasetKind::Hex]
            .into_iter()
            .filter_map(|kind| self.state.slot(kind).dataset())
            .find_map(|dataset| dataset.get(geoid))
    }

    pub fn selected_properties(&self) -> Option<PropertyTable> {
        self.selected_feature()
            .map(|feature| PropertyTable::for_feature(feature, &self.config.input.id_field))
    }

    pub fn locate(&self, lon: f64, lat: f64) -> Option<&GeoFeature> {
        let dataset = self.state.tract.dataset.as_ref()?;
        let index = self.state.tract_index.as_ref()?;
        index
            .locate(dataset, lon, lat)
            .and_then(|position| dataset.features().get(position))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchReport {
    pub generation: u64,
    pub hex: LoadOutcome,
    pub tract: LoadOutcome,
}

/// Switches the indicator and loads both datasets concurrently.
///
/// Each dataset is applied as soon as its own fetch finishes. The lock is
/// never held across a fetch.
pub async fn switch_indicator<M, F>(
    dashboard: &SharedDashboard<M>,
    loader: &GeoLoader<F>,
    indicator: &str,
) -> Result<SwitchReport, DashboardError>
where
    M: MapView,
    F: Fetch,
{
    let request = dashboard.lock().begin_indicator_change(indicator)?;
    let generation = request.generation;

    let hex = async {
        let result = loader.load(DatasetKind::Hex, &request.hex).await;
        let outcome = dashboard.lock().complete_load(generation, DatasetKind::Hex, result);
        outcome
    };
    let tract = async {
        let result = loader.load(DatasetKind::Tract, &request.tract).await;
        let outcome = dashboard
            .lock()
            .complete_load(generation, DatasetKind::Tract, result);
        outcome
    };
    let (hex, tract) = tokio::join!(hex, tract);

    Ok(SwitchReport {
        generation,
        hex,
        tract,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{hexes, tracts, MemoryFetcher, HEXES_GEOJSON, TRACTS_GEOJSON};
    use crate::headless::{HeadlessMap, Scene};
    use crate::style::YELLOW;
    use crate::table::PropertyRow;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
[[indicators]]
key = "OZ"
label = "Ozone"
hex = { geometry = "oz/hex.geojson" }
tract = { geometry = "oz/tracts.geojson" }

[[indicators]]
key = "PM25"
hex = { geometry = "pm/hex.geojson" }
tract = { geometry = "pm/tracts.geojson", attributes = "pm/aqi.csv" }

[[indicators]]
key = "NONE"
hex = { geometry = "oz/hex.geojson" }
tract = { geometry = "oz/tracts.geojson" }
"#;

    const ONE_TRACT: &str = r#"{ "type": "FeatureCollection", "features": [
        { "type": "Feature", "properties": { "GEOID": "A", "OZ": 1 },
          "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] } }
    ]}"#;

    fn dashboard() -> Dashboard<HeadlessMap> {
        Dashboard::new(AppConfig::from_toml_str(CONFIG).unwrap(), |_| {
            HeadlessMap::new()
        })
    }

    fn loaded(indicator: &str) -> Dashboard<HeadlessMap> {
        let mut dashboard = dashboard();
        let request = dashboard.begin_indicator_change(indicator).unwrap();
        assert_eq!(
            dashboard.complete_load(request.generation, DatasetKind::Hex, Ok(hexes())),
            LoadOutcome::Applied
        );
        assert_eq!(
            dashboard.complete_load(request.generation, DatasetKind::Tract, Ok(tracts())),
            LoadOutcome::Applied
        );
        dashboard
    }

    fn scenes(dashboard: &Dashboard<HeadlessMap>) -> Vec<Scene> {
        ViewRole::ALL
            .iter()
            .map(|role| dashboard.view(*role).map().scene())
            .collect()
    }

    fn selected(geoid: &str) -> ClickOutcome {
        ClickOutcome::Selected {
            geoid: geoid.to_string(),
            skipped: Vec::new(),
        }
    }

    fn bold_tracts(dashboard: &Dashboard<HeadlessMap>) -> Vec<String> {
        dashboard
            .view(ViewRole::Choropleth)
            .map()
            .scene()
            .layers
            .into_iter()
            .filter(|l| l.style.weight == 5.0)
            .map(|l| l.geoid)
            .collect()
    }

    fn transport_error() -> LoadError {
        LoadError::Transport {
            location: "pm/hex.geojson".to_string(),
            status: 500,
        }
    }

    #[test]
    fn clicks_wait_for_both_datasets() {
        let mut dashboard = dashboard();
        assert_eq!(dashboard.state().phase(), Phase::Idle);
        assert_eq!(dashboard.on_any_view_clicked("A"), ClickOutcome::Ignored);

        let request = dashboard.begin_indicator_change("oz").unwrap();
        assert_eq!(request.indicator, "OZ");
        assert_eq!(dashboard.state().phase(), Phase::Loading);

        dashboard.complete_load(request.generation, DatasetKind::Hex, Ok(hexes()));
        assert_eq!(dashboard.on_any_view_clicked("A"), ClickOutcome::Ignored);
        assert_eq!(dashboard.state().selection().selected(), None);

        dashboard.complete_load(request.generation, DatasetKind::Tract, Ok(tracts()));
        assert_eq!(dashboard.state().phase(), Phase::Rendered);
        assert_eq!(dashboard.view(ViewRole::Hex).map().layer_count(), 4);
        assert_eq!(dashboard.view(ViewRole::Choropleth).map().layer_count(), 4);
        assert!(dashboard.view(ViewRole::Hex).map().viewport().is_some());
    }

    #[test]
    fn unknown_indicator_is_rejected() {
        let mut dashboard = dashboard();
        assert!(matches!(
            dashboard.begin_indicator_change("NO2"),
            Err(DashboardError::UnknownIndicator(_))
        ));
        assert_eq!(dashboard.state().generation(), 0);
    }

    #[test]
    fn selection_fans_out_to_every_view() {
        let mut dashboard = loaded("OZ");
        assert_eq!(dashboard.on_any_view_clicked("A"), selected("A"));
        assert_eq!(dashboard.state().phase(), Phase::Selected);

        let hex = dashboard.view(ViewRole::Hex).map().scene();
        let top = hex.layers.last().unwrap();
        assert_eq!((top.geoid.as_str(), top.style.fill_color), ("A", YELLOW));
        assert_eq!(bold_tracts(&dashboard), vec!["A"]);

        let detail = dashboard.view(ViewRole::Detail).map().viewport().unwrap();
        assert_eq!(detail.center, [0.5, 0.5]);
        assert_eq!(detail.zoom, 13.0);

        let neighbors = dashboard.view(ViewRole::Neighbors);
        assert_eq!(neighbors.neighbors().collect::<Vec<_>>(), vec!["B", "C"]);
        assert_eq!(neighbors.map().layer_count(), 3);

        assert_eq!(dashboard.state().selection().highlight_count(), 6);
    }

    #[test]
    fn new_selection_resets_the_previous_one() {
        let mut dashboard = loaded("OZ");
        dashboard.on_any_view_clicked("A");
        dashboard.on_any_view_clicked("B");

        assert_eq!(bold_tracts(&dashboard), vec!["B"]);
        let yellow: Vec<String> = dashboard
            .view(ViewRole::Hex)
            .map()
            .scene()
            .layers
            .into_iter()
            .filter(|l| l.style.fill_color == YELLOW)
            .map(|l| l.geoid)
            .collect();
        assert_eq!(yellow, vec!["B"]);
        assert_eq!(
            dashboard.view(ViewRole::Detail).map().viewport().unwrap().center,
            [1.5, 0.5]
        );
    }

    #[test]
    fn clicking_twice_matches_clicking_once() {
        let mut once = loaded("OZ");
        once.on_any_view_clicked("B");

        let mut twice = loaded("OZ");
        twice.on_any_view_clicked("B");
        twice.on_any_view_clicked("B");

        assert_eq!(scenes(&once), scenes(&twice));
        assert_eq!(once.state().selection(), twice.state().selection());
    }

    #[test]
    fn map_clicks_are_dispatched_from_any_view() {
        let mut dashboard = loaded("OZ");
        let handle = dashboard
            .view(ViewRole::Choropleth)
            .handle_for("C")
            .unwrap();
        dashboard
            .view_mut(ViewRole::Choropleth)
            .map_mut()
            .click(handle);
        assert_eq!(dashboard.process_clicks(), vec![selected("C")]);

        // C touches A along an edge and B at a corner.
        let neighbor = dashboard
            .view(ViewRole::Neighbors)
            .handle_for("B")
            .unwrap();
        dashboard
            .view_mut(ViewRole::Neighbors)
            .map_mut()
            .click(neighbor);
        assert_eq!(dashboard.process_clicks(), vec![selected("B")]);
        assert!(dashboard.process_clicks().is_empty());
    }

    #[test]
    fn view_click_handlers_drive_the_fan_out() {
        let mut dashboard = loaded("OZ");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dashboard
            .view_mut(ViewRole::Hex)
            .on_feature_click(move |geoid| sink.lock().push(geoid.to_string()));

        let handle = dashboard.view(ViewRole::Hex).handle_for("D").unwrap();
        dashboard.view_mut(ViewRole::Hex).map_mut().click(handle);
        assert_eq!(dashboard.process_clicks(), vec![selected("D")]);
        assert_eq!(*seen.lock(), vec!["D".to_string()]);
        assert_eq!(dashboard.state().selection().selected(), Some("D"));

        // Nothing left queued once dispatched.
        assert!(dashboard.process_clicks().is_empty());
    }

    #[test]
    fn click_feature_requires_a_drawn_feature() {
        let mut dashboard = loaded("OZ");
        assert_eq!(
            dashboard.click_feature(ViewRole::Neighbors, "A"),
            ClickOutcome::NotInView
        );
        assert_eq!(dashboard.click_feature(ViewRole::Hex, "D"), selected("D"));
    }

    #[test]
    fn lookup_miss_leaves_view_untouched() {
        let mut dashboard = dashboard();
        let request = dashboard.begin_indicator_change("OZ").unwrap();
        let partial_hexes: Vec<GeoFeature> = hexes()
            .features()
            .iter()
            .filter(|f| f.id != "C")
            .cloned()
            .collect();
        dashboard.complete_load(
            request.generation,
            DatasetKind::Hex,
            Ok(GeoDataset::new(DatasetKind::Hex, partial_hexes).unwrap()),
        );
        dashboard.complete_load(request.generation, DatasetKind::Tract, Ok(tracts()));

        dashboard.on_any_view_clicked("A");
        let hex_before = dashboard.view(ViewRole::Hex).map().scene();

        assert_eq!(
            dashboard.on_any_view_clicked("C"),
            ClickOutcome::Selected {
                geoid: "C".to_string(),
                skipped: vec![ViewRole::Hex],
            }
        );
        assert_eq!(dashboard.view(ViewRole::Hex).map().scene(), hex_before);
        assert_eq!(bold_tracts(&dashboard), vec!["C"]);

        let before = scenes(&dashboard);
        assert_eq!(
            dashboard.on_any_view_clicked("Z"),
            ClickOutcome::Selected {
                geoid: "Z".to_string(),
                skipped: ViewRole::ALL.to_vec(),
            }
        );
        assert_eq!(scenes(&dashboard), before);
    }

    #[test]
    fn indicator_change_tears_down_selection_views() {
        let mut dashboard = loaded("OZ");
        dashboard.on_any_view_clicked("A");

        dashboard.begin_indicator_change("PM25").unwrap();
        assert_eq!(dashboard.state().phase(), Phase::Loading);
        assert_eq!(dashboard.state().selection(), &SelectionState::default());
        for role in [ViewRole::Detail, ViewRole::Neighbors] {
            assert!(!dashboard.view(role).is_mounted());
            assert_eq!(dashboard.view(role).map().layer_count(), 0);
        }
        // Overviews stay drawn, without the old highlight.
        assert_eq!(dashboard.view(ViewRole::Hex).map().layer_count(), 4);
        assert!(bold_tracts(&dashboard).is_empty());
        assert_eq!(dashboard.on_any_view_clicked("A"), ClickOutcome::Ignored);
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let mut dashboard = dashboard();
        let first = dashboard.begin_indicator_change("OZ").unwrap();
        let second = dashboard.begin_indicator_change("PM25").unwrap();
        assert!(second.generation > first.generation);

        assert_eq!(
            dashboard.complete_load(second.generation, DatasetKind::Hex, Ok(hexes())),
            LoadOutcome::Applied
        );
        assert_eq!(
            dashboard.complete_load(second.generation, DatasetKind::Tract, Ok(tracts())),
            LoadOutcome::Applied
        );
        assert_eq!(
            dashboard.complete_load(first.generation, DatasetKind::Tract, Ok(tracts().subset(&[0]))),
            LoadOutcome::Stale
        );
        assert_eq!(
            dashboard.complete_load(first.generation, DatasetKind::Hex, Err(transport_error())),
            LoadOutcome::Stale
        );

        assert_eq!(dashboard.state().indicator(), Some("PM25"));
        assert_eq!(dashboard.state().phase(), Phase::Rendered);
        assert_eq!(dashboard.view(ViewRole::Choropleth).map().layer_count(), 4);
        assert_eq!(
            dashboard.state().slot(DatasetKind::Tract).range(),
            Some(IndicatorRange {
                min: 7.0,
                max: 11.0,
                count: 3
            })
        );
    }

    #[test]
    fn failed_load_keeps_previous_rendering() {
        let mut dashboard = loaded("OZ");
        let before = dashboard.view(ViewRole::Hex).map().scene();

        let request = dashboard.begin_indicator_change("PM25").unwrap();
        assert_eq!(
            dashboard.complete_load(request.generation, DatasetKind::Hex, Err(transport_error())),
            LoadOutcome::Failed
        );
        assert_eq!(dashboard.view(ViewRole::Hex).map().scene(), before);
        assert_eq!(dashboard.state().slot(DatasetKind::Hex).status(), SlotStatus::Failed);

        dashboard.complete_load(request.generation, DatasetKind::Tract, Ok(tracts()));
        assert_eq!(dashboard.state().phase(), Phase::LoadFailed);
        assert_eq!(dashboard.on_any_view_clicked("A"), ClickOutcome::Ignored);
    }

    #[test]
    fn legend_is_suppressed_without_numeric_values() {
        let dashboard = loaded("OZ");
        let legend = dashboard.legend(DatasetKind::Tract).unwrap();
        assert_eq!((legend.min, legend.max), (0.02, 0.05));
        assert_eq!(legend.stops.len(), 7);

        let dashboard = loaded("NONE");
        assert_eq!(dashboard.legend(DatasetKind::Tract), None);
        assert_eq!(dashboard.legend(DatasetKind::Hex), None);
        assert_eq!(dashboard.state().phase(), Phase::Rendered);
    }

    #[test]
    fn selected_properties_and_point_lookup() {
        let mut dashboard = loaded("OZ");
        assert!(dashboard.selected_properties().is_none());

        dashboard.on_any_view_clicked("B");
        let table = dashboard.selected_properties().unwrap();
        assert_eq!(
            table.rows[0],
            PropertyRow {
                key: "GEOID".to_string(),
                value: "B".to_string(),
            }
        );
        assert_eq!(dashboard.locate(0.5, 0.5).map(|f| f.id.as_str()), Some("A"));
        assert!(dashboard.locate(9.0, 9.0).is_none());
    }

    fn fetcher(oz_tracts: &str) -> MemoryFetcher {
        MemoryFetcher::new()
            .with("oz/hex.geojson", HEXES_GEOJSON)
            .with("oz/tracts.geojson", oz_tracts)
            .with("pm/hex.geojson", HEXES_GEOJSON)
            .with("pm/tracts.geojson", TRACTS_GEOJSON)
            .with("pm/aqi.csv", "GEOID,PM25\nA,7\nB,9\nC,8\nD,11\n")
    }

    #[tokio::test]
    async fn switch_loads_both_datasets() {
        let dashboard: SharedDashboard<HeadlessMap> = Arc::new(Mutex::new(self::dashboard()));
        let loader = GeoLoader::new(fetcher(TRACTS_GEOJSON), "GEOID");

        let report = switch_indicator(&dashboard, &loader, "PM25").await.unwrap();
        assert_eq!(
            report,
            SwitchReport {
                generation: 1,
                hex: LoadOutcome::Applied,
                tract: LoadOutcome::Applied,
            }
        );

        let mut dashboard = dashboard.lock();
        assert_eq!(
            dashboard.state().slot(DatasetKind::Tract).range().map(|r| (r.min, r.max)),
            Some((7.0, 11.0))
        );
        assert_eq!(dashboard.on_any_view_clicked("C"), selected("C"));
    }

    #[tokio::test]
    async fn slow_superseded_fetch_does_not_win() {
        let fetcher = fetcher(ONE_TRACT);
        let release_hex = fetcher.gate("oz/hex.geojson");
        let release_tract = fetcher.gate("oz/tracts.geojson");
        let loader = Arc::new(GeoLoader::new(fetcher, "GEOID"));
        let dashboard: SharedDashboard<HeadlessMap> = Arc::new(Mutex::new(self::dashboard()));

        let first = tokio::spawn({
            let dashboard = Arc::clone(&dashboard);
            let loader = Arc::clone(&loader);
            async move { switch_indicator(&dashboard, &*loader, "OZ").await }
        });
        loop {
            let generation = dashboard.lock().state().generation();
            if generation >= 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let second = switch_indicator(&dashboard, &*loader, "PM25").await.unwrap();
        assert_eq!((second.hex, second.tract), (LoadOutcome::Applied, LoadOutcome::Applied));

        let _ = release_hex.send(());
        let _ = release_tract.send(());
        let first = first.await.unwrap().unwrap();
        assert_eq!((first.hex, first.tract), (LoadOutcome::Stale, LoadOutcome::Stale));

        let dashboard = dashboard.lock();
        assert_eq!(dashboard.state().indicator(), Some("PM25"));
        assert_eq!(dashboard.state().generation(), 2);
        assert_eq!(dashboard.view(ViewRole::Choropleth).map().layer_count(), 4);
    }
}
