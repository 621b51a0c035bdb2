// Cliente de la Web API de Spotify: playlists, búsqueda y autorización
// con refresh token (flujo authorization code hecho fuera de banda).

use super::{CatalogClient, Page, PlaylistSummary, PlaylistTrack, TrackRef};
use crate::error::CatalogError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
pub const SCOPES: &str = "playlist-modify-private playlist-read-private";

/// Margen antes del vencimiento en el que ya se renueva el token
const EXPIRY_MARGIN_SECS: i64 = 60;

/// URL donde el usuario autoriza la app para obtener el refresh token.
pub fn authorize_url(
    accounts_base: &str,
    client_id: &str,
    redirect_uri: &str,
) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(&format!(
        "{}/authorize",
        accounts_base.trim_end_matches('/')
    ))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPES);
    Ok(url.to_string())
}

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

// Respuestas de la API (solo los campos usados)

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<Option<T>>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
    owner: OwnerObject,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct OwnerObject {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<TrackObject>,
}

impl From<PlaylistObject> for PlaylistSummary {
    fn from(playlist: PlaylistObject) -> Self {
        Self {
            id: playlist.id,
            name: playlist.name,
            owner_id: playlist.owner.id,
            url: playlist.external_urls.spotify,
        }
    }
}

/// Handle explícito a Spotify, construido una vez y pasado por referencia.
pub struct SpotifyClient {
    client: reqwest::Client,
    credentials: SpotifyCredentials,
    api_base: String,
    accounts_base: String,
    token: tokio::sync::Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(
        client: reqwest::Client,
        credentials: SpotifyCredentials,
        api_base: &str,
        accounts_base: &str,
    ) -> Self {
        Self {
            client,
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            accounts_base: accounts_base.trim_end_matches('/').to_string(),
            token: tokio::sync::Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut lock = self.token.lock().await;
        if let Some(token) = lock.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.refresh_access_token().await?;
        let value = token.value.clone();
        *lock = Some(token);
        Ok(value)
    }

    async fn refresh_access_token(&self) -> Result<AccessToken, CatalogError> {
        debug!("🔑 Renovando access token de Spotify");
        let basic = general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_base))
            .header(AUTHORIZATION, format!("Basic {basic}"))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(body));
        }
        let token: TokenResponse = Self::parse(response).await?;
        info!("🔑 Access token de Spotify renovado");

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Envía una petición autenticada a la API.
    ///
    /// Si la API responde 401 el token se descarta, se renueva y la petición
    /// se reenvía una sola vez.
    async fn send<F>(&self, method: Method, path: &str, build: F) -> Result<Response, CatalogError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send,
    {
        let url = format!("{}{}", self.api_base, path);

        let token = self.access_token().await?;
        let response = build(self.client.request(method.clone(), &url).bearer_auth(token))
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        debug!("🔑 Spotify rechazó el token en {}, renovando", path);
        self.token.lock().await.take();
        let token = self.access_token().await?;
        let response = build(self.client.request(method, &url).bearer_auth(token))
            .send()
            .await?;
        Self::check(response).await
    }

    async fn check(response: Response) -> Result<Response, CatalogError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited {
                retry_after: super::retry_after(response.headers()),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
        let bytes = Self::check(response).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CatalogError::UnexpectedShape(e.to_string()))
    }

    async fn fetch<T, F>(&self, method: Method, path: &str, build: F) -> Result<T, CatalogError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder + Send,
    {
        Self::parse(self.send(method, path, build).await?).await
    }
}

/// Cuerpo del DELETE: cada ocurrencia se nombra por URI y posición exacta.
fn removal_body(occurrences: &[PlaylistTrack]) -> serde_json::Value {
    let tracks: Vec<serde_json::Value> = occurrences
        .iter()
        .map(|t| json!({ "uri": t.uri, "positions": [t.position] }))
        .collect();
    json!({ "tracks": tracks })
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    async fn current_user_id(&self) -> Result<String, CatalogError> {
        let me: CurrentUser = self.fetch(Method::GET, "/me", |b| b).await?;
        Ok(me.id)
    }

    async fn list_playlists(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistSummary>, CatalogError> {
        let page: Paging<PlaylistObject> = self
            .fetch(Method::GET, "/me/playlists", |b| {
                b.query(&[("offset", offset), ("limit", limit)])
            })
            .await?;

        Ok(Page {
            page_len: page.items.len(),
            has_next: page.next.is_some(),
            items: page.items.into_iter().flatten().map(Into::into).collect(),
        })
    }

    async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistSummary, CatalogError> {
        let body = json!({ "name": name, "public": false });
        let playlist: PlaylistObject = self
            .fetch(Method::POST, &format!("/users/{user_id}/playlists"), |b| {
                b.json(&body)
            })
            .await?;
        info!("🆕 Playlist creada: {}", playlist.name);
        Ok(playlist.into())
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PlaylistTrack>, CatalogError> {
        let page: Paging<PlaylistItem> = self
            .fetch(Method::GET, &format!("/playlists/{playlist_id}/tracks"), |b| {
                b.query(&[("offset", offset), ("limit", limit)])
                    .query(&[("fields", "items(track(id,uri)),next")])
            })
            .await?;

        // La posición cuenta también las entradas sin track (archivos locales, etc.)
        let items = page
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let track = item.as_ref()?.track.as_ref()?;
                Some(PlaylistTrack {
                    id: track.id.clone()?,
                    uri: track.uri.clone(),
                    position: offset + index,
                })
            })
            .collect();

        Ok(Page {
            items,
            page_len: page.items.len(),
            has_next: page.next.is_some(),
        })
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, CatalogError> {
        let response: SearchResponse = self
            .fetch(Method::GET, "/search", |b| {
                b.query(&[("q", query), ("type", "track")])
                    .query(&[("limit", limit)])
            })
            .await?;

        Ok(response
            .tracks
            .items
            .into_iter()
            .flatten()
            .filter_map(|track| {
                Some(TrackRef {
                    id: track.id?,
                    uri: track.uri,
                })
            })
            .collect())
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), CatalogError> {
        let body = json!({ "uris": uris });
        self.send(Method::POST, &format!("/playlists/{playlist_id}/tracks"), |b| {
            b.json(&body)
        })
        .await?;
        Ok(())
    }

    async fn remove_occurrences(
        &self,
        playlist_id: &str,
        occurrences: &[PlaylistTrack],
    ) -> Result<(), CatalogError> {
        let body = removal_body(occurrences);
        self.send(Method::DELETE, &format!("/playlists/{playlist_id}/tracks"), |b| {
            b.json(&body)
        })
        .await?;
        Ok(())
    }
}
