//! Vultr backend implementation of instance provisioning.
//!
//! Creation resolves the human-friendly request (city, OS search term, plan
//! id) against the provider catalogue before posting the instance.

mod error;
mod types;

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::backend::{Backend, BackendFuture, InstanceHandle, InstanceRequest, InstanceSnapshot};
use crate::config::ProviderConfig;
use types::{
    ApiErrorBody, CreateInstanceBody, InstanceEnvelope, OperatingSystem, OsList, PLAN_TYPE, Plan,
    PlanList, Region, RegionList, select_os, select_plan, select_region,
};

pub use error::VultrBackendError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "500";

/// Catalogue entries a request resolved to, ready to be launched.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOffer {
    /// Label attached to the new instance.
    pub label: String,
    /// Provider region identifier.
    pub region_id: String,
    /// City of the region.
    pub region_city: String,
    /// Provider operating system identifier.
    pub os_id: u64,
    /// Full operating system name.
    pub os_name: String,
    /// Plan identifier.
    pub plan_id: String,
    /// Monthly price of the plan in US dollars.
    pub monthly_cost: f64,
}

/// Backend that provisions instances through the Vultr v2 API.
#[derive(Clone)]
pub struct VultrBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for VultrBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VultrBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl VultrBackend {
    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VultrBackendError::Config`] when the configuration fails
    /// validation and [`VultrBackendError::Http`] when the HTTP client cannot
    /// be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, VultrBackendError> {
        config.validate()?;
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: config.api_key.trim().to_owned(),
            base_url: config.base_url.trim().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(&[("per_page", PAGE_SIZE)])
    }

    async fn send<T: DeserializeOwned>(
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, VultrBackendError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|parsed| parsed.error)
                .unwrap_or(body);
            return Err(VultrBackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|err| VultrBackendError::Decode {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })
    }

    async fn find_region(&self, city: &str) -> Result<Region, VultrBackendError> {
        info!(city, "searching for region");
        let list: RegionList = Self::send("/regions", self.get("/regions")).await?;
        let region = select_region(&list.regions, city)
            .cloned()
            .ok_or_else(|| VultrBackendError::RegionNotFound {
                city: city.to_owned(),
            })?;
        info!(region = %region.id, "found region");
        Ok(region)
    }

    async fn find_os(&self, name: &str) -> Result<OperatingSystem, VultrBackendError> {
        info!(name, "searching for operating system");
        let list: OsList = Self::send("/os", self.get("/os")).await?;
        let os = select_os(&list.os, name)
            .cloned()
            .ok_or_else(|| VultrBackendError::OsNotFound {
                name: name.to_owned(),
            })?;
        info!(os = %os.name, os_id = os.id, "found operating system");
        Ok(os)
    }

    async fn find_plan(&self, plan_id: &str, region: &Region) -> Result<Plan, VultrBackendError> {
        info!(plan = plan_id, city = %region.city, "searching for plan");
        let request = self
            .get("/plans")
            .query(&[("type", PLAN_TYPE), ("region", region.id.as_str())]);
        let list: PlanList = Self::send("/plans", request).await?;
        let plan = select_plan(&list.plans, plan_id)
            .cloned()
            .ok_or_else(|| VultrBackendError::PlanNotFound {
                plan: plan_id.to_owned(),
                region: region.city.clone(),
            })?;
        info!(plan = %plan.id, monthly_cost = plan.monthly_cost, "found plan");
        Ok(plan)
    }

    /// Resolves the region city, OS search term, and plan id of `request`
    /// against the provider catalogue without creating anything.
    ///
    /// # Errors
    ///
    /// Returns [`VultrBackendError::Validation`] for an incomplete request,
    /// the matching `*NotFound` variant when a lookup has no match, and
    /// [`VultrBackendError::Api`] or [`VultrBackendError::Http`] when a
    /// catalogue call fails.
    pub async fn resolve(
        &self,
        request: &InstanceRequest,
    ) -> Result<ResolvedOffer, VultrBackendError> {
        request.validate()?;
        let region = self.find_region(&request.region_city).await?;
        let os = self.find_os(&request.os_name).await?;
        let plan = self.find_plan(&request.plan_id, &region).await?;
        Ok(ResolvedOffer {
            label: request.label.clone(),
            region_id: region.id,
            region_city: region.city,
            os_id: os.id,
            os_name: os.name,
            plan_id: plan.id,
            monthly_cost: plan.monthly_cost,
        })
    }

    /// Creates an instance from a resolved offer. The returned snapshot
    /// carries the temporary root password when the provider issued one.
    ///
    /// # Errors
    ///
    /// Returns [`VultrBackendError::Api`] when the provider rejects the
    /// request and [`VultrBackendError::Decode`] for an unexpected response.
    pub async fn launch(
        &self,
        offer: &ResolvedOffer,
    ) -> Result<InstanceSnapshot, VultrBackendError> {
        info!(
            os = %offer.os_name,
            plan = %offer.plan_id,
            monthly_cost = offer.monthly_cost,
            region = %offer.region_city,
            "deploying new server"
        );
        let body = CreateInstanceBody {
            label: &offer.label,
            region: &offer.region_id,
            plan: &offer.plan_id,
            os_id: offer.os_id,
        };
        let post = self
            .client
            .post(self.url("/instances"))
            .bearer_auth(&self.api_key)
            .json(&body);
        let envelope: InstanceEnvelope = Self::send("/instances", post).await?;
        Ok(envelope.instance.into())
    }
}

impl Backend for VultrBackend {
    type Error = VultrBackendError;

    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error> {
        Box::pin(async move {
            let offer = self.resolve(request).await?;
            self.launch(&offer).await
        })
    }

    fn fetch_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error> {
        Box::pin(async move {
            let path = format!("/instances/{}", handle.id);
            let request = self.client.get(self.url(&path)).bearer_auth(&self.api_key);
            let envelope: InstanceEnvelope = Self::send(&path, request).await?;
            Ok(envelope.instance.into())
        })
    }
}

#[cfg(test)]
mod tests;
