//! Mapping between typed parameters and the provider's flat attribute bag.
//!
//! Each kind declares a table of [`AttributeField`]s. The table drives three
//! pure operations: rendering request attributes, computing the changed
//! attributes between desired and observed state, and late-initializing unset
//! parameters from observed values.

use crate::{policy, sns::AttributeBag, Result};

/// How a rendered parameter is compared with the observed attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    /// Plain string equality
    Text,
    /// `"true"`/`"false"`, case-insensitive; empty reads as false
    Bool,
    /// JSON documents compared as values, falling back to string equality
    Json,
    /// Access policies compared semantically
    Policy,
}

/// Whether the provider accepts changes to an attribute after creation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// One row of a kind's attribute table
pub struct AttributeField<P> {
    /// The attribute name used by the provider
    pub name: &'static str,

    pub comparator: Comparator,

    pub mutability: Mutability,

    /// The parameter's value rendered as an attribute, `None` when unset
    pub render: fn(&P) -> Option<String>,

    /// The optional parameter populated from the observed attribute
    pub late_init: Option<fn(&mut P) -> &mut Option<String>>,
}

impl<P> AttributeField<P> {
    /// Render for a provider request: policies are sent in canonical form.
    fn request_value(&self, value: &str) -> Result<String> {
        match self.comparator {
            Comparator::Policy if !value.trim().is_empty() => {
                Ok(policy::Policy::parse(value)?.to_json())
            }
            _ => Ok(value.to_string()),
        }
    }
}

impl Comparator {
    pub fn equal(self, desired: &str, observed: &str) -> Result<bool> {
        match self {
            Comparator::Text => Ok(desired == observed),
            Comparator::Bool => Ok(truthy(desired) == truthy(observed)),
            Comparator::Json => Ok(json_equal(desired, observed)),
            Comparator::Policy => policy::documents_equal(desired, observed),
        }
    }
}

fn truthy(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn json_equal(desired: &str, observed: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(desired),
        serde_json::from_str::<serde_json::Value>(observed),
    ) {
        (Ok(desired), Ok(observed)) => desired == observed,
        _ => desired == observed,
    }
}

/// Attributes whose desired value differs from the observed one.
///
/// Unset parameters render as the empty string and missing attributes read as
/// the empty string, since the provider reports unset attributes that way.
/// Immutable attributes are included; callers decide what to do with them.
pub fn diff<P>(table: &[AttributeField<P>], params: &P, observed: &AttributeBag) -> Result<AttributeBag> {
    let mut changed = AttributeBag::new();
    for field in table {
        let desired = (field.render)(params).unwrap_or_default();
        let current = observed.get(field.name).map(String::as_str).unwrap_or_default();

        if !field.comparator.equal(&desired, current)? {
            changed.insert(field.name.to_string(), field.request_value(&desired)?);
        }
    }

    Ok(changed)
}

/// True when no attribute needs to change, i.e. [`diff`] is empty.
pub fn is_up_to_date<P>(table: &[AttributeField<P>], params: &P, observed: &AttributeBag) -> Result<bool> {
    Ok(diff(table, params, observed)?.is_empty())
}

/// Non-empty rendered attributes selected by `include`, ready for a provider request.
pub fn render<P>(
    table: &[AttributeField<P>],
    params: &P,
    include: impl Fn(&AttributeField<P>) -> bool,
) -> Result<AttributeBag> {
    table
        .iter()
        .filter(|field| include(field))
        .filter_map(|field| {
            (field.render)(params)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    field
                        .request_value(&value)
                        .map(|value| (field.name.to_string(), value))
                })
        })
        .collect()
}

/// Split a diff into the attributes that can be updated and the names of those that cannot.
pub fn partition<P>(table: &[AttributeField<P>], changed: AttributeBag) -> (AttributeBag, Vec<String>) {
    let mut updatable = AttributeBag::new();
    let mut immutable = vec![];
    for (name, value) in changed {
        let mutability = table
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.mutability)
            .unwrap_or(Mutability::Immutable);
        match mutability {
            Mutability::Mutable => {
                updatable.insert(name, value);
            }
            Mutability::Immutable => immutable.push(name),
        }
    }

    (updatable, immutable)
}

/// Fill unset optional parameters from observed, non-empty attributes.
///
/// Never overwrites a set parameter. Returns whether anything changed.
pub fn late_initialize<P>(table: &[AttributeField<P>], params: &mut P, observed: &AttributeBag) -> bool {
    let mut changed = false;
    for field in table {
        let Some(slot) = field.late_init else { continue };
        let Some(value) = observed.get(field.name).filter(|v| !v.is_empty()) else {
            continue;
        };

        let target = slot(params);
        if target.is_none() {
            *target = Some(value.clone());
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Params {
        label: Option<String>,
        policy: Option<String>,
        settings: Option<String>,
        flag: Option<bool>,
    }

    fn label(p: &mut Params) -> &mut Option<String> {
        &mut p.label
    }

    fn policy(p: &mut Params) -> &mut Option<String> {
        &mut p.policy
    }

    const TABLE: &[AttributeField<Params>] = &[
        AttributeField {
            name: "Label",
            comparator: Comparator::Text,
            mutability: Mutability::Mutable,
            render: |p| p.label.clone(),
            late_init: Some(label),
        },
        AttributeField {
            name: "Policy",
            comparator: Comparator::Policy,
            mutability: Mutability::Mutable,
            render: |p| p.policy.clone(),
            late_init: Some(policy),
        },
        AttributeField {
            name: "Settings",
            comparator: Comparator::Json,
            mutability: Mutability::Mutable,
            render: |p| p.settings.clone(),
            late_init: None,
        },
        AttributeField {
            name: "Flag",
            comparator: Comparator::Bool,
            mutability: Mutability::Immutable,
            render: |p| p.flag.filter(|f| *f).map(|_| "true".to_string()),
            late_init: None,
        },
    ];

    fn bag(entries: &[(&str, &str)]) -> AttributeBag {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unset_parameters_match_empty_attributes() {
        let params = Params::default();
        let observed = bag(&[("Label", ""), ("Flag", "false")]);

        assert!(diff(TABLE, &params, &observed).unwrap().is_empty());
        assert!(is_up_to_date(TABLE, &params, &AttributeBag::new()).unwrap());
    }

    #[test]
    fn changed_attributes_only() {
        let params = Params {
            label: Some("new".into()),
            settings: Some(r#"{"b": 1, "a": [1, 2]}"#.into()),
            ..Default::default()
        };
        let observed = bag(&[("Label", "old"), ("Settings", r#"{"a":[1,2],"b":1}"#)]);

        let changed = diff(TABLE, &params, &observed).unwrap();
        assert_eq!(changed, bag(&[("Label", "new")]));
        assert!(!is_up_to_date(TABLE, &params, &observed).unwrap());
    }

    #[test]
    fn policies_are_sent_canonically() {
        let params = Params {
            policy: Some(r#"{ "Version": "2012-10-17", "Statement": { "Effect": "Allow", "Action": ["a"] } }"#.into()),
            ..Default::default()
        };

        let changed = diff(TABLE, &params, &AttributeBag::new()).unwrap();
        let sent: serde_json::Value = serde_json::from_str(&changed["Policy"]).unwrap();
        assert_json_eq!(
            sent,
            json!({"Version": "2012-10-17", "Statement": [{"Effect": "Allow", "Action": "a"}]})
        );
    }

    #[test]
    fn invalid_policies_fail_the_diff() {
        let params = Params {
            policy: Some("{".into()),
            ..Default::default()
        };

        assert!(matches!(
            diff(TABLE, &params, &bag(&[("Policy", "{}")])),
            Err(crate::Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn render_skips_unset_and_filtered_fields() {
        let params = Params {
            label: Some("x".into()),
            flag: Some(true),
            ..Default::default()
        };

        let all = render(TABLE, &params, |_| true).unwrap();
        assert_eq!(all, bag(&[("Label", "x"), ("Flag", "true")]));

        let immutable = render(TABLE, &params, |f| f.mutability == Mutability::Immutable).unwrap();
        assert_eq!(immutable, bag(&[("Flag", "true")]));

        let unset_flag = Params {
            flag: Some(false),
            ..Default::default()
        };
        assert!(render(TABLE, &unset_flag, |_| true).unwrap().is_empty());
    }

    #[test]
    fn partition_separates_immutable_changes() {
        let changed = bag(&[("Label", "x"), ("Flag", "true")]);
        let (updatable, immutable) = partition(TABLE, changed);

        assert_eq!(updatable, bag(&[("Label", "x")]));
        assert_eq!(immutable, vec!["Flag".to_string()]);
    }

    #[test]
    fn late_init_fills_only_unset_fields() {
        let mut params = Params {
            label: Some("mine".into()),
            ..Default::default()
        };
        let observed = bag(&[
            ("Label", "theirs"),
            ("Policy", r#"{"Version":"2012-10-17","Statement":[]}"#),
            ("Settings", "{}"),
        ]);

        assert!(late_initialize(TABLE, &mut params, &observed));
        assert_eq!(params.label.as_deref(), Some("mine"));
        assert!(params.policy.is_some());
        assert!(params.settings.is_none());

        // idempotent
        let before = params.clone();
        assert!(!late_initialize(TABLE, &mut params, &observed));
        assert_eq!(params, before);
    }

    #[test]
    fn late_init_ignores_empty_attributes() {
        let mut params = Params::default();
        let rendered = render(TABLE, &params, |_| true).unwrap();

        assert!(!late_initialize(TABLE, &mut params, &rendered));
        assert!(!late_initialize(TABLE, &mut params, &bag(&[("Label", "")])));
        assert_eq!(params, Params::default());
    }
}
