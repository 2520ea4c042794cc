//! Wire types for the Vultr v2 API.

use serde::{Deserialize, Serialize};

use crate::backend::{InstanceSnapshot, InstanceStatus};

/// Architecture the operating system lookup is restricted to.
pub(crate) const REQUIRED_ARCH: &str = "x64";

/// Plan family offered for regular cloud compute.
pub(crate) const PLAN_TYPE: &str = "vc2";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct Region {
    pub(crate) id: String,
    pub(crate) city: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegionList {
    pub(crate) regions: Vec<Region>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct OperatingSystem {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) arch: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsList {
    pub(crate) os: Vec<OperatingSystem>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct Plan {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) monthly_cost: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlanList {
    pub(crate) plans: Vec<Plan>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct Instance {
    pub(crate) id: String,
    pub(crate) status: InstanceStatus,
    #[serde(default)]
    pub(crate) main_ip: String,
    #[serde(default)]
    pub(crate) default_password: Option<String>,
}

impl From<Instance> for InstanceSnapshot {
    fn from(value: Instance) -> Self {
        Self {
            id: value.id,
            status: value.status,
            main_ip: value.main_ip,
            default_password: value.default_password.filter(|pw| !pw.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstanceEnvelope {
    pub(crate) instance: Instance,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateInstanceBody<'a> {
    pub(crate) label: &'a str,
    pub(crate) region: &'a str,
    pub(crate) plan: &'a str,
    pub(crate) os_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) error: String,
}

pub(crate) fn select_region<'a>(regions: &'a [Region], city: &str) -> Option<&'a Region> {
    let wanted = city.to_lowercase();
    regions
        .iter()
        .find(|region| region.city.to_lowercase() == wanted)
}

pub(crate) fn select_os<'a>(systems: &'a [OperatingSystem], name: &str) -> Option<&'a OperatingSystem> {
    let needle = name.to_lowercase();
    systems
        .iter()
        .find(|os| os.arch == REQUIRED_ARCH && os.name.to_lowercase().contains(&needle))
}

pub(crate) fn select_plan<'a>(plans: &'a [Plan], plan_id: &str) -> Option<&'a Plan> {
    plans.iter().find(|plan| plan.id == plan_id)
}
