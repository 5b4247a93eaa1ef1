use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::TaskInfo;

pub const CPUS: &str = "cpus";
pub const MEM: &str = "mem";

// scalars are tracked in thousandths, the same precision the resource manager keeps
const SCALE: f64 = 1000.0;
// absorbs binary representation error, so 0.3 still reads as 300 thousandths
const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub String);

impl Display for OfferId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OfferId {
    fn from(s: &str) -> Self {
        OfferId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub scalar_value: f64,
}

impl Resource {
    pub fn scalar(name: &str, value: f64) -> Self {
        Resource {
            name: name.to_string(),
            scalar_value: value,
        }
    }
}

/// A capacity grant for a single host. `host_ref` is the resource manager's
/// handle for the agent on that host and is passed back untouched on launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub host_ref: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Offer {
    /// Sums the `cpus` and `mem` scalars of the offer. Other resource kinds are
    /// ignored; negative or non-finite values are rejected.
    pub fn resources(&self) -> Result<Resources> {
        let mut cpus = 0.0;
        let mut mem = 0.0;
        for r in &self.resources {
            if !r.scalar_value.is_finite() || r.scalar_value < 0.0 {
                return Err(Error::InvalidResource {
                    name: r.name.clone(),
                    value: r.scalar_value,
                });
            }
            match r.name.as_str() {
                CPUS => cpus += r.scalar_value,
                MEM => mem += r.scalar_value,
                _ => {}
            }
        }
        Ok(Resources::offered(cpus, mem))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    pub cpu: u64,
    pub mem: u64,
}

impl Resources {
    /// Capacity on offer. Partial thousandths are dropped so an offer is
    /// never credited with more than it grants.
    pub fn offered(cpus: f64, mem: f64) -> Self {
        Resources {
            cpu: (cpus.max(0.0) * SCALE + EPSILON).floor() as u64,
            mem: (mem.max(0.0) * SCALE + EPSILON).floor() as u64,
        }
    }

    /// Capacity a task needs. Partial thousandths count as a whole one.
    pub fn required(cpus: f64, mem: f64) -> Self {
        Resources {
            cpu: (cpus.max(0.0) * SCALE - EPSILON).ceil().max(0.0) as u64,
            mem: (mem.max(0.0) * SCALE - EPSILON).ceil().max(0.0) as u64,
        }
    }

    pub fn cpus(&self) -> f64 {
        self.cpu as f64 / SCALE
    }

    pub fn mem(&self) -> f64 {
        self.mem as f64 / SCALE
    }

    pub fn fits(&self, demand: &Resources) -> bool {
        self.cpu >= demand.cpu && self.mem >= demand.mem
    }

    pub fn checked_sub(&self, demand: &Resources) -> Option<Resources> {
        Some(Resources {
            cpu: self.cpu.checked_sub(demand.cpu)?,
            mem: self.mem.checked_sub(demand.mem)?,
        })
    }

    pub fn to_wire(&self) -> Vec<Resource> {
        vec![
            Resource::scalar(CPUS, self.cpus()),
            Resource::scalar(MEM, self.mem()),
        ]
    }
}

/// Answer for a single offer, keyed by its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfferDecision {
    Accept { offer_id: OfferId, tasks: Vec<TaskInfo> },
    Decline { offer_id: OfferId },
}

impl OfferDecision {
    pub fn offer_id(&self) -> &OfferId {
        match self {
            OfferDecision::Accept { offer_id, .. } => offer_id,
            OfferDecision::Decline { offer_id } => offer_id,
        }
    }

    pub fn tasks(&self) -> &[TaskInfo] {
        match self {
            OfferDecision::Accept { tasks, .. } => tasks,
            OfferDecision::Decline { .. } => &[],
        }
    }
}
