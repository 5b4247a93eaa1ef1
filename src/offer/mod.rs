mod matcher;
mod offer;

pub use matcher::{match_offer, LaunchTemplate};
pub use offer::{Offer, OfferDecision, OfferId, Resource, Resources, CPUS, MEM};
