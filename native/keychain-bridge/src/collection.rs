// Search list marshalling between managed reference arrays and native lists

use crate::error::BridgeResult;
use crate::handle::{HandleRegistry, KeychainRef, RefFlavor};
use crate::native::{KeychainList, SecurityApi};

/// Build a native list from references, preserving order.
///
/// If any element cannot be unwrapped the partially built list is dropped,
/// which releases it, and the error is returned.
pub fn to_native<A: SecurityApi>(
    api: &A,
    registry: &HandleRegistry,
    keychains: &[Option<KeychainRef>],
) -> BridgeResult<A::List> {
    let mut list = api.new_list(keychains.len());
    for (index, keychain) in keychains.iter().enumerate() {
        let raw = registry
            .unwrap(keychain.as_ref())
            .map_err(|e| e.metadata("index", index.to_string()))?;
        list.push(raw);
    }
    Ok(list)
}

/// Wrap every element of a native list.
///
/// Elements are retained before wrapping since the list only lends them.
pub fn to_managed<A: SecurityApi>(api: &A, registry: &HandleRegistry, list: &A::List) -> Vec<KeychainRef> {
    (0..list.len())
        .filter_map(|index| list.get(index))
        .map(|raw| {
            api.retain(raw);
            registry.wrap(raw, RefFlavor::Plain)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeErrorCode;
    use crate::native::MemorySecurity;

    fn open_all(api: &MemorySecurity, registry: &HandleRegistry, paths: &[&str]) -> Vec<KeychainRef> {
        paths
            .iter()
            .map(|path| {
                let raw = api.create(path, b"secret").unwrap();
                registry.wrap(raw, RefFlavor::Plain)
            })
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_order_and_identity() {
        let api = MemorySecurity::new();
        let registry = HandleRegistry::new();
        let refs = open_all(&api, &registry, &["/k/c.keychain", "/k/a.keychain", "/k/b.keychain"]);
        let input: Vec<Option<KeychainRef>> = refs.iter().copied().map(Some).collect();

        let list = to_native(&api, &registry, &input).unwrap();
        let output = to_managed(&api, &registry, &list);
        drop(list);

        let expected: Vec<_> = refs.iter().map(|r| registry.resolve(r.handle()).unwrap()).collect();
        let actual: Vec<_> = output.iter().map(|r| registry.resolve(r.handle()).unwrap()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_to_managed_retains_elements() {
        let api = MemorySecurity::new();
        let registry = HandleRegistry::new();
        let refs = open_all(&api, &registry, &["/k/one.keychain"]);
        let raw = registry.resolve(refs[0].handle()).unwrap();

        let list = to_native(&api, &registry, &[Some(refs[0])]).unwrap();
        assert_eq!(api.retain_count(raw), Some(2));

        let managed = to_managed(&api, &registry, &list);
        assert_eq!(managed.len(), 1);
        assert_eq!(api.retain_count(raw), Some(3));

        drop(list);
        assert_eq!(api.retain_count(raw), Some(2));
    }

    #[test]
    fn test_failed_element_releases_partial_list() {
        let api = MemorySecurity::new();
        let registry = HandleRegistry::new();
        let refs = open_all(&api, &registry, &["/k/one.keychain"]);
        let raw = registry.resolve(refs[0].handle()).unwrap();

        let error = to_native(&api, &registry, &[Some(refs[0]), None]).unwrap_err();
        assert_eq!(error.code(), BridgeErrorCode::NullArgument);
        assert_eq!(error.context().metadata.get("index").map(String::as_str), Some("1"));
        assert_eq!(api.retain_count(raw), Some(1));
    }
}
