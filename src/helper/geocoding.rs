use crate::models::StoryDraft;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Story saves wait on the lookup, so it must give up well before clients do.
pub const GEOCODER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Geocoder returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Malformed geocoder response: {0}")]
    Malformed(String),
}

/// Resolves free-text locations. `Ok(None)` means the service had no match.
#[allow(async_fn_in_trait)]
pub trait Geocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Client for a Nominatim-compatible `/search` endpoint.
#[derive(Clone)]
pub struct NominatimGeocoder {
    http_client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, GeocodeError> {
        Self::with_timeout(base_url, user_agent, GEOCODER_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(NominatimGeocoder {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Takes the first place of a Nominatim JSON array.
pub fn parse_search_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let latitude = place
        .lat
        .parse::<f64>()
        .map_err(|_| GeocodeError::Malformed(format!("latitude '{}'", place.lat)))?;
    let longitude = place
        .lon
        .parse::<f64>()
        .map_err(|_| GeocodeError::Malformed(format!("longitude '{}'", place.lon)))?;
    Ok(Some(Coordinates { latitude, longitude }))
}

impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }
        let body = response.text().await?;
        parse_search_response(&body)
    }
}

/// Fills missing coordinates from the story's location. Only consulted when
/// a location is given and both coordinates are absent; a miss or a service
/// failure leaves the draft as it was.
pub async fn fill_story_coordinates<G: Geocoder + ?Sized>(geocoder: &G, draft: &mut StoryDraft) {
    let location = draft.location.trim();
    if location.is_empty() || draft.latitude.is_some() || draft.longitude.is_some() {
        return;
    }
    match geocoder.geocode(location).await {
        Ok(Some(coords)) => {
            draft.latitude = Some(coords.latitude);
            draft.longitude = Some(coords.longitude);
        }
        Ok(None) => log::warn!("No geocoding match for '{}'; saving story without coordinates", location),
        Err(e) => log::warn!("Geocoding '{}' failed: {}; saving story without coordinates", location, e),
    }
}
