//! crates/velgo_core/src/domain.rs
//!
//! Defines the core types and rules of the booking workflow: which
//! collections exist, how a submission is stamped on creation, how an
//! administrator moves it through its status lifecycle, and who counts as an
//! administrator. Nothing here touches the network.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::ports::{Direction, Query};
use crate::value::{Document, FieldValue};

/// Field names written or read by the server.
pub mod fields {
    pub const TIMESTAMP: &str = "timestamp";
    pub const USER_UID: &str = "user_uid";
    pub const USER_EMAIL: &str = "user_email";
    pub const STATUS: &str = "status";
    pub const REJECTION_REASON: &str = "rejection_reason";
    pub const STATUS_UPDATED_AT: &str = "status_updated_at";
    pub const SERVICE: &str = "service";
    pub const ROLE: &str = "role";
    pub const EMAIL: &str = "email";
}

pub const BOOKINGS_COLLECTION: &str = "bookings";
pub const CONSULTATIONS_COLLECTION: &str = "consultations";
pub const USERS_COLLECTION: &str = "users";

pub const DEFAULT_REJECTION_REASON: &str = "No reason provided.";
pub const UNKNOWN_EMAIL: &str = "N/A";
pub const DEFAULT_ADMIN_EMAIL: &str = "Admin";
pub const ADMIN_ROLE: &str = "admin";

/// The service categories a booking can be filed under.
pub const SERVICE_CATEGORIES: [&str; 6] = [
    "Agri Consulting",
    "Soil Testing",
    "Crop Planning",
    "Livestock Integration",
    "AI & IoT Farming",
    "Farm Management",
];

//=========================================================================================
// Submissions
//=========================================================================================

/// The two kinds of submission the public site can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Booking,
    Consultation,
}

impl SubmissionKind {
    pub fn collection(self) -> &'static str {
        match self {
            Self::Booking => BOOKINGS_COLLECTION,
            Self::Consultation => CONSULTATIONS_COLLECTION,
        }
    }

    /// Resolves a client-supplied collection name. Only submission
    /// collections are addressable.
    pub fn from_collection(name: &str) -> Option<Self> {
        match name {
            BOOKINGS_COLLECTION => Some(Self::Booking),
            CONSULTATIONS_COLLECTION => Some(Self::Consultation),
            _ => None,
        }
    }

    /// The message returned to the submitter once the document is stored.
    pub fn acknowledgement(self) -> &'static str {
        match self {
            Self::Booking => "Booking received!",
            Self::Consultation => "Consultation request received!",
        }
    }
}

/// Lifecycle state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Parses a status an administrator may move a submission to.
    /// `pending` is only ever set at creation.
    pub fn parse_target(value: &str) -> Option<Self> {
        Self::parse(value).filter(|status| *status != Self::Pending)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identity the identity provider has vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: Option<String>,
}

/// Stamps a client payload with server-side metadata. Server fields win over
/// client fields with the same name.
pub fn new_submission(
    mut document: Document,
    identity: &VerifiedIdentity,
    now: DateTime<Utc>,
) -> Document {
    let email = identity
        .email
        .clone()
        .unwrap_or_else(|| UNKNOWN_EMAIL.to_string());

    document.insert(fields::TIMESTAMP.into(), FieldValue::Timestamp(now));
    document.insert(fields::USER_UID.into(), identity.uid.clone().into());
    document.insert(fields::USER_EMAIL.into(), email.into());
    document.insert(
        fields::STATUS.into(),
        SubmissionStatus::Pending.as_str().into(),
    );
    document.insert(fields::REJECTION_REASON.into(), FieldValue::Null);
    document
}

/// A validated status transition, ready to be written as a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    status: SubmissionStatus,
    rejection_reason: Option<String>,
}

impl StatusUpdate {
    /// A rejection always carries a reason (falling back to a placeholder);
    /// every other status clears it.
    pub fn new(status: SubmissionStatus, reason: Option<&str>) -> Self {
        let rejection_reason = match status {
            SubmissionStatus::Rejected => Some(
                reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_REJECTION_REASON)
                    .to_string(),
            ),
            _ => None,
        };
        Self {
            status,
            rejection_reason,
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn into_changes(self, now: DateTime<Utc>) -> Document {
        Document::from([
            (fields::STATUS.to_string(), self.status.as_str().into()),
            (fields::STATUS_UPDATED_AT.to_string(), FieldValue::Timestamp(now)),
            (
                fields::REJECTION_REASON.to_string(),
                self.rejection_reason.into(),
            ),
        ])
    }
}

//=========================================================================================
// Administrators
//=========================================================================================

/// The administrator attached to a browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub uid: String,
    pub email: String,
}

/// Outcome of checking a verified identity against its user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAuthorization {
    Granted(AdminIdentity),
    NotAdmin,
    RecordMissing,
}

/// Decides whether a verified identity may open an admin session. The role
/// must be exactly `admin`.
pub fn authorize_admin(
    identity: &VerifiedIdentity,
    user_record: Option<&Document>,
) -> AdminAuthorization {
    let Some(record) = user_record else {
        return AdminAuthorization::RecordMissing;
    };

    let is_admin = record.get(fields::ROLE).and_then(FieldValue::as_str) == Some(ADMIN_ROLE);
    if !is_admin {
        return AdminAuthorization::NotAdmin;
    }

    let email = record
        .get(fields::EMAIL)
        .and_then(FieldValue::as_str)
        .map(str::to_string)
        .or_else(|| identity.email.clone())
        .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());

    AdminAuthorization::Granted(AdminIdentity {
        uid: identity.uid.clone(),
        email,
    })
}

//=========================================================================================
// Admin panel views
//=========================================================================================

/// What the admin panel was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminView {
    Dashboard,
    Consultations,
    Category(&'static str),
    Unrecognized(String),
}

impl AdminView {
    pub fn parse(view: Option<&str>) -> Self {
        match view {
            None | Some("dashboard") => Self::Dashboard,
            Some("consultations") => Self::Consultations,
            Some(other) => SERVICE_CATEGORIES
                .iter()
                .find(|category| **category == other)
                .copied()
                .map_or_else(|| Self::Unrecognized(other.to_string()), Self::Category),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Consultations => CONSULTATIONS_COLLECTION,
            Self::Category(category) => category,
            Self::Unrecognized(other) => other,
        }
    }

    /// The collection and query backing this view, newest first. Views with
    /// no data return `None`.
    pub fn query(&self) -> Option<(&'static str, Query)> {
        match self {
            Self::Consultations => Some((
                CONSULTATIONS_COLLECTION,
                Query::new().order_by(fields::TIMESTAMP, Direction::Descending),
            )),
            Self::Category(category) => Some((
                BOOKINGS_COLLECTION,
                Query::new()
                    .where_eq(fields::SERVICE, *category)
                    .order_by(fields::TIMESTAMP, Direction::Descending),
            )),
            Self::Dashboard | Self::Unrecognized(_) => None,
        }
    }
}
