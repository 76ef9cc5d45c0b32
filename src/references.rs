//! Cross-object references: a field holding a concrete identifier, a named
//! sibling, or a label selector over siblings.

use kube::ResourceExt;
use tracing::debug;

use crate::{
    resources::{Reference, Selector, Topic},
    store::ObjectStore,
    Error, Result,
};

/// A reference-kind field borrowed out of a spec
pub struct ReferenceField<'a> {
    /// The kind of the referenced sibling, used in errors
    pub kind: &'static str,

    pub value: &'a mut Option<String>,

    pub reference: &'a mut Option<Reference>,

    pub selector: Option<&'a Selector>,
}

/// Resolve `field` to a concrete identifier.
///
/// Returns whether the field changed. A set value is never touched and a field
/// with neither a reference nor a selector is left empty.
pub async fn resolve<K>(
    field: ReferenceField<'_>,
    store: &dyn ObjectStore<K>,
    extract: fn(&K) -> String,
) -> Result<bool>
where
    K: ResourceExt,
{
    if field.value.as_deref().is_some_and(|v| !v.is_empty()) {
        return Ok(false);
    }

    let (target, name) = if let Some(reference) = field.reference.as_ref() {
        let target = store
            .get(&reference.name)
            .await?
            .ok_or_else(|| Error::ReferenceNotFound {
                kind: field.kind.into(),
                name: reference.name.clone(),
            })?;
        (target, reference.name.clone())
    } else if let Some(selector) = field.selector {
        let mut matches = store.list(&selector.match_labels).await?;
        match matches.len() {
            1 => {
                let target = matches.remove(0);
                let name = target.name_any();
                (target, name)
            }
            0 => {
                return Err(Error::ReferenceNotFound {
                    kind: field.kind.into(),
                    name: format_selector(selector),
                })
            }
            count => {
                return Err(Error::ReferenceAmbiguous {
                    kind: field.kind.into(),
                    count,
                })
            }
        }
    } else {
        return Ok(false);
    };

    let resolved = extract(&target);
    if resolved.is_empty() {
        return Err(Error::ReferenceNotReady {
            kind: field.kind.into(),
            name,
        });
    }

    debug!(kind = field.kind, %name, %resolved, "resolved reference");
    *field.value = Some(resolved);
    if field.reference.is_none() {
        *field.reference = Some(Reference { name });
    }

    Ok(true)
}

fn format_selector(selector: &Selector) -> String {
    selector
        .match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// The ARN of a topic, empty until it has been observed
pub fn topic_arn(topic: &Topic) -> String {
    topic.arn().unwrap_or_default().to_string()
}
