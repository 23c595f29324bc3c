//! Hostname Router & TLS Demux: maps a `Host` header or TLS SNI name to a
//! [`Site`], scopes a request to that site's devices, and resolves the TLS
//! certificate pair for a given SNI name.
//!
//! The site/device configuration itself lives in an external store; this
//! module only consumes it through the narrow [`SiteConfigStore`] trait and
//! holds the loaded result in a reload-capable registry -- one-way ownership,
//! atomic pointer swap on reload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::db::{Device, Site};
use crate::error::AppError;

/// Narrow interface onto the external configuration store. Production wires
/// this to whatever store holds the real site/device records; tests and
/// local runs use [`InMemorySiteConfigStore`].
#[async_trait]
pub trait SiteConfigStore: Send + Sync {
    async fn load_sites(&self) -> Result<Vec<Site>, AppError>;
    async fn load_devices(&self) -> Result<Vec<Device>, AppError>;
}

/// A fixed, in-memory implementation for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemorySiteConfigStore {
    sites: Vec<Site>,
    devices: Vec<Device>,
}

impl InMemorySiteConfigStore {
    pub fn new(sites: Vec<Site>, devices: Vec<Device>) -> Self {
        Self { sites, devices }
    }
}

#[async_trait]
impl SiteConfigStore for InMemorySiteConfigStore {
    async fn load_sites(&self) -> Result<Vec<Site>, AppError> {
        Ok(self.sites.clone())
    }

    async fn load_devices(&self) -> Result<Vec<Device>, AppError> {
        Ok(self.devices.clone())
    }
}

/// A consistent, point-in-time view of sites and devices: `hostname -> Site`,
/// `site.id -> [Device]`, plus the designated default site.
pub struct SiteRegistrySnapshot {
    by_hostname: HashMap<String, Site>,
    devices_by_site: HashMap<String, Vec<Device>>,
    devices_by_name: HashMap<String, Device>,
    default_site: Option<Site>,
}

impl SiteRegistrySnapshot {
    fn build(sites: Vec<Site>, devices: Vec<Device>) -> Self {
        let mut devices_by_site: HashMap<String, Vec<Device>> = HashMap::new();
        let mut devices_by_name: HashMap<String, Device> = HashMap::new();
        for device in devices {
            devices_by_name.insert(device.name.clone(), device.clone());
            // Devices aren't explicitly site-scoped in the data model;
            // scoping happens through `site.device_id`.
            devices_by_site.entry(device.id.clone()).or_default().push(device);
        }

        let default_site = sites
            .iter()
            .find(|s| s.hostname.is_none())
            .or_else(|| sites.first())
            .cloned();

        let by_hostname = sites
            .into_iter()
            .filter_map(|s| s.hostname.clone().map(|h| (normalize_host(&h), s)))
            .collect();

        Self {
            by_hostname,
            devices_by_site,
            devices_by_name,
            default_site,
        }
    }

    /// Resolve a `Host` header (or SNI name) to a site, falling back to the
    /// default site when there's no exact match.
    pub fn resolve(&self, host: &str) -> Option<&Site> {
        let normalized = normalize_host(host);
        self.by_hostname.get(&normalized).or(self.default_site.as_ref())
    }

    /// The primary device for a site, via `site.device_id`.
    pub fn primary_device(&self, site: &Site) -> Option<&Device> {
        let device_id = site.device_id.as_ref()?;
        self.devices_by_site.get(device_id).and_then(|v| v.first())
    }

    /// Whether `stationname` names a known device.
    pub fn has_station(&self, stationname: &str) -> bool {
        self.devices_by_name.contains_key(stationname)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices_by_name.get(name)
    }

    /// Every known device, for the station-discovery endpoints
    /// (`/stationinfo`, `/api/stations`, `/api/remote-stations`).
    pub fn all_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices_by_name.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hostname.is_empty() && self.default_site.is_none()
    }

    /// TLS certificate paths for an SNI name: exact match first, then
    /// `*.suffix` wildcard entries by suffix, then the first configured
    /// certificate.
    pub fn tls_cert_for_sni(&self, sni: &str) -> Option<(&str, &str)> {
        let normalized = normalize_host(sni);
        if let Some(site) = self.by_hostname.get(&normalized) {
            if let (Some(cert), Some(key)) = (&site.tls_cert_path, &site.tls_key_path) {
                return Some((cert, key));
            }
        }
        for (hostname, site) in &self.by_hostname {
            if let Some(suffix) = hostname.strip_prefix("*.") {
                if normalized.ends_with(suffix) {
                    if let (Some(cert), Some(key)) = (&site.tls_cert_path, &site.tls_key_path) {
                        return Some((cert, key));
                    }
                }
            }
        }
        self.by_hostname.values().find_map(|s| match (&s.tls_cert_path, &s.tls_key_path) {
            (Some(c), Some(k)) => Some((c.as_str(), k.as_str())),
            _ => None,
        })
    }
}

/// Lowercase a `Host` header and strip a trailing `:port`.
pub fn normalize_host(host: &str) -> String {
    let without_port = host.split(':').next().unwrap_or(host);
    without_port.to_ascii_lowercase()
}

/// Whether the request's peer address counts as localhost, for the "no sites
/// configured" escape hatch.
pub fn is_localhost(addr: &str) -> bool {
    let host = addr.split(':').next().unwrap_or(addr);
    host == "127.0.0.1" || host == "::1" || host == "localhost"
}

/// Reload-capable registry: readers always see a fully-consistent pre- or
/// post-reload snapshot via a single `Arc` swap.
pub struct SiteRegistry {
    store: Arc<dyn SiteConfigStore>,
    snapshot: RwLock<Arc<SiteRegistrySnapshot>>,
}

impl SiteRegistry {
    pub async fn load(store: Arc<dyn SiteConfigStore>) -> Result<Self, AppError> {
        let snapshot = Self::build_snapshot(store.as_ref()).await?;
        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    async fn build_snapshot(store: &dyn SiteConfigStore) -> Result<SiteRegistrySnapshot, AppError> {
        let sites = store.load_sites().await?;
        let devices = store.load_devices().await?;
        Ok(SiteRegistrySnapshot::build(sites, devices))
    }

    /// Atomically replace the snapshot; in-flight requests keep the `Arc`
    /// they already cloned.
    pub async fn reload(&self) -> Result<(), AppError> {
        let fresh = Self::build_snapshot(self.store.as_ref()).await?;
        let mut guard = self.snapshot.write().expect("site registry lock poisoned");
        *guard = Arc::new(fresh);
        Ok(())
    }

    pub fn current(&self) -> Arc<SiteRegistrySnapshot> {
        self.snapshot.read().expect("site registry lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, hostname: Option<&str>, device_id: Option<&str>) -> Site {
        Site {
            id: id.to_string(),
            hostname: hostname.map(|h| h.to_string()),
            device_id: device_id.map(|d| d.to_string()),
            snow_enabled: false,
            snow_device_name: None,
            snow_base_distance: None,
            forecast_provider_enabled: false,
            is_portal: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.to_string(),
            name: name.to_string(),
            device_type: "davis".to_string(),
            enabled: true,
            latitude: None,
            longitude: None,
            altitude: None,
            base_snow_distance: None,
        }
    }

    #[test]
    fn resolves_exact_hostname() {
        let snapshot = SiteRegistrySnapshot::build(
            vec![site("a", Some("weather.example.com"), Some("d1"))],
            vec![device("d1", "CSI")],
        );
        let resolved = snapshot.resolve("Weather.Example.com:443").unwrap();
        assert_eq!(resolved.id, "a");
    }

    #[test]
    fn falls_back_to_default_site() {
        let snapshot = SiteRegistrySnapshot::build(vec![site("a", None, Some("d1"))], vec![]);
        let resolved = snapshot.resolve("unknown.example.com").unwrap();
        assert_eq!(resolved.id, "a");
    }

    #[test]
    fn wildcard_sni_matches_by_suffix() {
        let mut wildcard = site("a", Some("*.example.com"), None);
        wildcard.tls_cert_path = Some("/certs/wild.pem".into());
        wildcard.tls_key_path = Some("/certs/wild.key".into());
        let snapshot = SiteRegistrySnapshot::build(vec![wildcard], vec![]);
        assert_eq!(
            snapshot.tls_cert_for_sni("weather.example.com"),
            Some(("/certs/wild.pem", "/certs/wild.key"))
        );
    }

    #[test]
    fn has_station_checks_device_name() {
        let snapshot = SiteRegistrySnapshot::build(vec![], vec![device("d1", "CSI")]);
        assert!(snapshot.has_station("CSI"));
        assert!(!snapshot.has_station("UNKNOWN"));
    }
}
