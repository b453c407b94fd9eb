//! Social content API seam and the Farcaster (Neynar-style) client.
//!
//! The engine consumes raw reaction counts and posts one reply cast per
//! admission; the platform's own ranking algorithm is never reimplemented
//! here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::EngagementCounts;

#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch reaction/reply counts for a single cast.
    async fn fetch_engagement(&self, cast_hash: &str) -> Result<EngagementCounts>;

    /// Post the dunk as a reply cast under `parent_cast_hash`, with an
    /// optional embed link. Returns the new cast's hash.
    async fn post_reply(
        &self,
        text: &str,
        parent_cast_hash: &str,
        embed_url: Option<&str>,
    ) -> Result<String>;
}

/// REST client for a Farcaster hub API (Neynar wire shapes).
pub struct FarcasterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Managed signer the bot account posts with.
    signer_uuid: String,
}

#[derive(Deserialize)]
struct CastEnvelope {
    cast: CastBody,
}

#[derive(Deserialize)]
struct CastBody {
    hash: String,
    #[serde(default)]
    reactions: Reactions,
    #[serde(default)]
    replies: Replies,
}

#[derive(Deserialize, Default)]
struct Reactions {
    #[serde(default)]
    likes_count: i64,
    #[serde(default)]
    recasts_count: i64,
}

#[derive(Deserialize, Default)]
struct Replies {
    #[serde(default)]
    count: i64,
}

#[derive(Serialize)]
struct PublishCast<'a> {
    signer_uuid: &'a str,
    text: &'a str,
    parent: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed<'a>>,
}

#[derive(Serialize)]
struct Embed<'a> {
    url: &'a str,
}

impl FarcasterClient {
    pub fn new(base_url: &str, api_key: &str, signer_uuid: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            signer_uuid: signer_uuid.to_string(),
        }
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(EngineError::ExternalService(format!(
            "{what} failed: http {status}: {body}"
        )))
    }
}

#[async_trait]
impl ContentApi for FarcasterClient {
    async fn fetch_engagement(&self, cast_hash: &str) -> Result<EngagementCounts> {
        let resp = self
            .http
            .get(format!("{}/v2/farcaster/cast", self.base_url))
            .header("x-api-key", &self.api_key)
            .query(&[("identifier", cast_hash), ("type", "hash")])
            .send()
            .await
            .map_err(EngineError::external)?;
        let env: CastEnvelope = Self::check(resp, "cast fetch")
            .await?
            .json()
            .await
            .map_err(EngineError::external)?;
        Ok(EngagementCounts {
            likes: env.cast.reactions.likes_count,
            recasts: env.cast.reactions.recasts_count,
            replies: env.cast.replies.count,
        })
    }

    async fn post_reply(
        &self,
        text: &str,
        parent_cast_hash: &str,
        embed_url: Option<&str>,
    ) -> Result<String> {
        let payload = PublishCast {
            signer_uuid: &self.signer_uuid,
            text,
            parent: parent_cast_hash,
            embeds: embed_url.map(|url| vec![Embed { url }]).unwrap_or_default(),
        };
        let resp = self
            .http
            .post(format!("{}/v2/farcaster/cast", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(EngineError::external)?;
        let env: CastEnvelope = Self::check(resp, "cast publish")
            .await?
            .json()
            .await
            .map_err(EngineError::external)?;
        Ok(env.cast.hash)
    }
}
