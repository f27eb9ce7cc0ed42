use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of job a work order is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Delivery,
    Repair,
}

impl Domain {
    /// Every status declared for this domain, in lifecycle order.
    pub fn statuses(self) -> Vec<Status> {
        match self {
            Domain::Delivery => DeliveryStatus::ALL.iter().copied().map(Status::Delivery).collect(),
            Domain::Repair => RepairStatus::ALL.iter().copied().map(Status::Repair).collect(),
        }
    }

    /// The status a freshly booked work order starts in.
    pub fn initial_status(self) -> Status {
        match self {
            Domain::Delivery => Status::Delivery(DeliveryStatus::Pending),
            Domain::Repair => Status::Repair(RepairStatus::Pending),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Delivery => write!(f, "delivery"),
            Domain::Repair => write!(f, "repair"),
        }
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delivery" => Ok(Domain::Delivery),
            "repair" => Ok(Domain::Repair),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InTransit,
    Completed,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 6] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Assigned,
        DeliveryStatus::InTransit,
        DeliveryStatus::Completed,
        DeliveryStatus::Failed,
        DeliveryStatus::Cancelled,
    ];

    /// Terminal statuses only leave through the reopen edge to `Assigned`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Completed | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Pending,
    InProgress,
    WaitingParts,
    Completed,
    Cancelled,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 5] = [
        RepairStatus::Pending,
        RepairStatus::InProgress,
        RepairStatus::WaitingParts,
        RepairStatus::Completed,
        RepairStatus::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            RepairStatus::Pending => "pending",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::WaitingParts => "waiting_parts",
            RepairStatus::Completed => "completed",
            RepairStatus::Cancelled => "cancelled",
        }
    }
}

/// A status tagged with the domain it belongs to.
///
/// Serialized as `{"delivery": "in_transit"}` so a stored value can never be
/// read back into the wrong domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Delivery(DeliveryStatus),
    Repair(RepairStatus),
}

impl Status {
    pub fn domain(self) -> Domain {
        match self {
            Status::Delivery(_) => Domain::Delivery,
            Status::Repair(_) => Domain::Repair,
        }
    }

    /// Whether tracking is expected while the work order sits in this status.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Status::Delivery(DeliveryStatus::InTransit) | Status::Repair(RepairStatus::InProgress)
        )
    }

    pub fn is_terminal(self) -> bool {
        match self {
            Status::Delivery(s) => s.is_terminal(),
            Status::Repair(_) => false,
        }
    }

    /// Parse a status name within a known domain.
    pub fn parse(domain: Domain, name: &str) -> Result<Self, String> {
        let name = name.trim().to_lowercase();
        let found = domain
            .statuses()
            .into_iter()
            .find(|s| s.to_string() == name);
        found.ok_or_else(|| format!("unknown {domain} status: {name}"))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Delivery(s) => write!(f, "{}", s.as_str()),
            Status::Repair(s) => write!(f, "{}", s.as_str()),
        }
    }
}

impl From<DeliveryStatus> for Status {
    fn from(s: DeliveryStatus) -> Self {
        Status::Delivery(s)
    }
}

impl From<RepairStatus> for Status {
    fn from(s: RepairStatus) -> Self {
        Status::Repair(s)
    }
}
