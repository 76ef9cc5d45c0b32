use kube::Resource;

/// Annotation holding the identifier of the remote resource
pub const ANNOTATION: &str = "crossplane.io/external-name";

/// The external name of `obj`, `None` when unset or empty
pub fn get_external_name<K: Resource>(obj: &K) -> Option<&str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION))
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

pub fn set_external_name<K: Resource>(obj: &mut K, name: impl Into<String>) {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ANNOTATION.into(), name.into());
}
