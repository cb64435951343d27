//! Helpers for common checks for the validity of data.

use std::collections::BTreeMap;

/// Groups `(host, broker_id)` pairs by ID and keeps the IDs claimed by more than one host.
///
/// Hosts are listed in the order they were yielded.
pub fn duplicate_broker_ids<'a, I>(brokers: I) -> BTreeMap<i32, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, i32)>,
{
    let mut by_id: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for (host, id) in brokers {
        by_id.entry(id).or_default().push(host.to_owned());
    }
    by_id.retain(|_, hosts| hosts.len() > 1);
    by_id
}
