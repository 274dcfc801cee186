//! Best-effort IP geolocation for the login audit trail.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::config;
use crate::model::Location;

/// Answer of an ip-api compatible endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Lookup {
    status: Option<String>,
    country: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    isp: Option<String>,
}

impl From<Lookup> for Location {
    fn from(lookup: Lookup) -> Self {
        let keep = |v: Option<String>| v.filter(|v| !v.is_empty());

        Location {
            country: keep(lookup.country),
            region: keep(lookup.region_name),
            city: keep(lookup.city),
            isp: keep(lookup.isp),
        }
    }
}

/// Resolve IP addresses to a [`Location`]. Never fails: any problem yields an
/// empty location.
#[derive(Clone, Default)]
pub struct Geolocator {
    inner: Option<(reqwest::Client, String)>,
}

impl Geolocator {
    /// Create a new [`Geolocator`], disabled when `config` is `None`.
    pub fn new(config: Option<&config::Geolocation>) -> Self {
        let inner = config.and_then(|config| {
            match reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
            {
                Ok(client) => Some((client, config.url.clone())),
                Err(err) => {
                    tracing::warn!(error = %err, "geolocation disabled, cannot build HTTP client");
                    None
                },
            }
        });

        Self { inner }
    }

    pub async fn locate(&self, ip: Option<&str>) -> Location {
        let Some((client, url)) = &self.inner else {
            return Location::default();
        };
        let Some(ip) = ip.filter(|ip| is_public(ip)) else {
            return Location::default();
        };

        let lookup = async {
            client
                .get(url.replace("{ip}", ip))
                .send()
                .await?
                .error_for_status()?
                .json::<Lookup>()
                .await
        };

        match lookup.await {
            Ok(lookup) if lookup.status.as_deref() != Some("fail") => lookup.into(),
            Ok(_) => Location::default(),
            Err(err) => {
                tracing::debug!(error = %err, %ip, "geolocation lookup failed");
                Location::default()
            },
        }
    }
}

/// Private, loopback and unparsable addresses are never looked up.
fn is_public(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast())
        },
        Ok(IpAddr::V6(ip)) => {
            !(ip.is_loopback() || ip.is_unspecified() || ip.is_unique_local())
        },
        Err(_) => false,
    }
}
