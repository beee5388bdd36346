use crate::models::{FilterCriteria, Offer, UnknownPolicy};
use crate::normalize::check_garden;

/// Check an offer against the user's search criteria. All checks must pass.
///
/// Unknown area or price always passes. Unknown floor or garden fails under
/// [`UnknownPolicy::Strict`] and passes under [`UnknownPolicy::Lenient`].
pub fn matches(offer: &Offer, filters: &FilterCriteria) -> bool {
    if let (Some(min_area), Some(area)) = (filters.min_area, offer.area) {
        if area < min_area {
            return false;
        }
    }

    if let (Some(max_price), Some(price)) = (filters.max_price, offer.price) {
        if price > max_price {
            return false;
        }
    }

    let lenient = filters.unknown_policy == UnknownPolicy::Lenient;

    if filters.ground_floor {
        match offer.floor {
            Some(0) => {}
            None if lenient => {}
            _ => return false,
        }
    }

    if filters.garden && !offer.garden && !check_garden(&offer.title) && !lenient {
        return false;
    }

    true
}

/// True when any district is a case-insensitive substring of the offer's
/// location and title. An empty district list matches everything.
pub fn matches_district(offer: &Offer, districts: &[String]) -> bool {
    if districts.is_empty() {
        return true;
    }

    let haystack = format!("{} {}", offer.location, offer.title).to_lowercase();
    districts
        .iter()
        .any(|district| haystack.contains(&district.to_lowercase()))
}
