//! Domain types shared by every component

pub mod alert;
pub mod facility;
pub mod geo;
pub mod subscription;

pub use alert::{
    title_case, truncate_chars, Alert, AlertKey, AlertPayload, Priority, GENERIC_ALERT_BODY,
    GENERIC_ALERT_TITLE,
};
pub use facility::{Facility, FacilityCategory, NewFacility};
pub use geo::{Coordinates, NearbyFacility, Resolution, ResolvedIncident};
pub use subscription::{
    ApplicationServerKey, KeyUnavailable, PushSubscription, SubscriptionKeys, SubscriptionRecord,
};
