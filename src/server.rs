use crate::config::AppConfig;
use crate::data::Layers;
use crate::processing::{process_arrow_lines, DistrictCounts, DistrictSummary};
use crate::render::Legend;
use crate::types::{District, DistrictCountMap};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::{BoundingRect, Contains, Point};
use geojson::FeatureCollection;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Wrapper for RTree indexing
pub struct DistrictIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for DistrictIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub counts: DistrictCounts,
    pub arrows: FeatureCollection,
    pub districts: Vec<District>,
    pub tree: RTree<DistrictIndex>,
}

impl AppState {
    pub fn new(config: &AppConfig, layers: Layers) -> Self {
        let counts = DistrictCounts::initialize(
            layers.registrations.as_ref(),
            layers.residences.as_ref(),
            &config.input.district_property,
        );

        let arrows = process_arrow_lines(layers.arrows.as_ref(), config.processing.shorten_percentage)
            .unwrap_or_else(|| FeatureCollection {
                bbox: None,
                features: Vec::new(),
                foreign_members: None,
            });

        let tree = build_index(&layers.districts);

        Self {
            counts,
            arrows,
            districts: layers.districts,
            tree,
        }
    }

    /// District whose boundary contains the point, if any.
    pub fn district_at(&self, lon: f64, lat: f64) -> Option<&District> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.districts.get(candidate.index))
            .find(|district| district.geometry.contains(&point))
    }
}

fn build_index(districts: &[District]) -> RTree<DistrictIndex> {
    let items: Vec<DistrictIndex> = districts.iter().enumerate().filter_map(|(i, district)| {
        // Empty geometries have no bounds and can never contain a point
        let rect = district.geometry.bounding_rect()?;
        Some(DistrictIndex {
            index: i,
            aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }).collect();

    RTree::bulk_load(items)
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct CountsResponse {
    registrations: DistrictCountMap,
    residents: DistrictCountMap,
}

pub fn router(state: Arc<AppState>, config: &AppConfig) -> Router {
    Router::new()
        .route("/api/counts", get(counts_handler))
        .route("/api/counts/{district}", get(district_counts_handler))
        .route("/api/arrows", get(arrows_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/district", get(district_handler))
        .nest_service("/data", ServeDir::new(&config.output.dir))
        .fallback_service(ServeDir::new(&config.server.static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, layers: Layers) -> Result<()> {
    info!("Building district index for {} boundaries...", layers.districts.len());
    let state = Arc::new(AppState::new(&config, layers));
    info!("District index built.");

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn counts_handler(State(state): State<Arc<AppState>>) -> Json<CountsResponse> {
    Json(CountsResponse {
        registrations: state.counts.registrations().clone(),
        residents: state.counts.residents().clone(),
    })
}

async fn district_counts_handler(
    State(state): State<Arc<AppState>>,
    Path(district): Path<String>,
) -> Json<DistrictSummary> {
    Json(state.counts.summary(&district))
}

async fn arrows_handler(State(state): State<Arc<AppState>>) -> Json<FeatureCollection> {
    Json(state.arrows.clone())
}

async fn legend_handler() -> Json<Legend> {
    Json(Legend::default())
}

async fn district_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<DistrictSummary>> {
    let found = state.district_at(params.lon, params.lat)
        .map(|district| state.counts.summary(&district.id));
    Json(found)
}
