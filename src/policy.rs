//! IAM-style access policy documents.
//!
//! SNS hands policies back reformatted: whitespace changes, principal lists come
//! back in a different order, single element lists collapse into scalars and
//! condition booleans are stringified. Parsing both sides into a [`Policy`] and
//! comparing their canonical forms makes all of those compare equal.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// A parsed access policy document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub version: String,
    pub id: Option<String>,

    /// Statements are kept in document order, the provider evaluates them that way.
    pub statements: Vec<Statement>,
}

/// Whether a statement grants or denies access
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single statement of a [`Policy`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Option<Principal>,
    pub not_principal: Option<Principal>,
    pub action: Vec<String>,
    pub not_action: Vec<String>,
    pub resource: Vec<String>,
    pub not_resource: Vec<String>,
    pub condition: ConditionMap,
}

/// The principals a statement applies to.
///
/// `aws`, `canonical_user` and `service` have set semantics; they are only
/// sorted when the policy is canonicalized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    /// Set when the principal is the bare `"*"` wildcard
    pub allow_anon: bool,
    pub aws: Vec<String>,
    pub canonical_user: Vec<String>,
    pub federated: Option<String>,
    pub service: Vec<String>,
}

/// Condition operator -> condition key -> value(s)
pub type ConditionMap = BTreeMap<String, BTreeMap<String, ConditionValue>>;

/// The leaf of a condition block
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionValue {
    Scalar(String),
    List(Vec<String>),
}

impl Policy {
    /// Parse a JSON policy document.
    pub fn parse(document: &str) -> Result<Self> {
        let raw: RawPolicy =
            serde_json::from_str(document).map_err(|e| Error::InvalidPolicy(e.to_string()))?;

        let statements = raw
            .statement
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(Statement::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: raw.version,
            id: raw.id,
            statements,
        })
    }

    /// Normal form used for comparison and serialization.
    ///
    /// Principal sets are sorted and deduplicated, condition lists are treated as
    /// sets and single element condition lists become scalars. Statement,
    /// action and resource ordering is left untouched.
    pub fn canonicalize(&self) -> Self {
        Self {
            version: self.version.clone(),
            id: self.id.clone(),
            statements: self.statements.iter().map(Statement::canonicalize).collect(),
        }
    }

    /// Semantic equality between two policies.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.canonicalize() == other.canonicalize()
    }

    /// Render the canonical JSON form accepted by the provider.
    pub fn to_json(&self) -> String {
        self.canonicalize().to_value().to_string()
    }

    fn to_value(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("Version".into(), Value::String(self.version.clone()));
        if let Some(id) = &self.id {
            doc.insert("Id".into(), Value::String(id.clone()));
        }
        doc.insert(
            "Statement".into(),
            Value::Array(self.statements.iter().map(Statement::to_value).collect()),
        );

        Value::Object(doc)
    }
}

/// Compare two policy documents semantically.
///
/// Two empty documents are equal, an empty document never equals a non-empty one.
pub fn documents_equal(desired: &str, observed: &str) -> Result<bool> {
    match (desired.trim().is_empty(), observed.trim().is_empty()) {
        (true, true) => Ok(true),
        (true, false) | (false, true) => Ok(false),
        (false, false) => Ok(Policy::parse(desired)?.equivalent(&Policy::parse(observed)?)),
    }
}

impl Statement {
    fn canonicalize(&self) -> Self {
        let condition = self
            .condition
            .iter()
            .map(|(operator, entries)| {
                let entries = entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.canonicalize()))
                    .collect();
                (operator.clone(), entries)
            })
            .collect();

        Self {
            principal: self.principal.as_ref().map(Principal::canonicalize),
            not_principal: self.not_principal.as_ref().map(Principal::canonicalize),
            condition,
            ..self.clone()
        }
    }

    fn to_value(&self) -> Value {
        let mut doc = Map::new();
        if let Some(sid) = &self.sid {
            doc.insert("Sid".into(), Value::String(sid.clone()));
        }
        let effect = match self.effect {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        };
        doc.insert("Effect".into(), Value::String(effect.into()));
        if let Some(principal) = &self.principal {
            doc.insert("Principal".into(), principal.to_value());
        }
        if let Some(principal) = &self.not_principal {
            doc.insert("NotPrincipal".into(), principal.to_value());
        }

        let lists = [
            ("Action", &self.action),
            ("NotAction", &self.not_action),
            ("Resource", &self.resource),
            ("NotResource", &self.not_resource),
        ];
        for (key, list) in lists {
            if let Some(value) = string_or_list(list) {
                doc.insert(key.into(), value);
            }
        }

        if !self.condition.is_empty() {
            let condition = self
                .condition
                .iter()
                .map(|(operator, entries)| {
                    let entries = entries
                        .iter()
                        .map(|(key, value)| (key.clone(), value.to_value()))
                        .collect::<Map<_, _>>();
                    (operator.clone(), Value::Object(entries))
                })
                .collect::<Map<_, _>>();
            doc.insert("Condition".into(), Value::Object(condition));
        }

        Value::Object(doc)
    }
}

impl Principal {
    fn canonicalize(&self) -> Self {
        Self {
            allow_anon: self.allow_anon,
            aws: sorted_set(&self.aws),
            canonical_user: sorted_set(&self.canonical_user),
            federated: self.federated.clone(),
            service: sorted_set(&self.service),
        }
    }

    fn to_value(&self) -> Value {
        if self.allow_anon {
            return Value::String("*".into());
        }

        let mut doc = Map::new();
        if let Some(aws) = string_or_list(&self.aws) {
            doc.insert("AWS".into(), aws);
        }
        if let Some(canonical_user) = string_or_list(&self.canonical_user) {
            doc.insert("CanonicalUser".into(), canonical_user);
        }
        if let Some(federated) = &self.federated {
            doc.insert("Federated".into(), Value::String(federated.clone()));
        }
        if let Some(service) = string_or_list(&self.service) {
            doc.insert("Service".into(), service);
        }

        Value::Object(doc)
    }
}

impl ConditionValue {
    fn canonicalize(&self) -> Self {
        match self {
            Self::Scalar(value) => Self::Scalar(value.clone()),
            Self::List(values) => {
                let mut values = sorted_set(values);
                if values.len() == 1 {
                    Self::Scalar(values.remove(0))
                } else {
                    Self::List(values)
                }
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Scalar(value) => Value::String(value.clone()),
            Self::List(values) => Value::Array(values.iter().cloned().map(Value::String).collect()),
        }
    }
}

fn sorted_set(values: &[String]) -> Vec<String> {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    values
}

fn string_or_list(values: &[String]) -> Option<Value> {
    match values {
        [] => None,
        [single] => Some(Value::String(single.clone())),
        many => Some(Value::Array(many.iter().cloned().map(Value::String).collect())),
    }
}

// Wire shapes accepted by the parser

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(values) => values,
            Self::One(value) => vec![value],
        }
    }
}

#[derive(Deserialize)]
struct RawPolicy {
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Statement", default)]
    statement: Option<OneOrMany<RawStatement>>,
}

#[derive(Deserialize)]
struct RawStatement {
    #[serde(rename = "Sid", default)]
    sid: Option<String>,
    #[serde(rename = "Effect")]
    effect: Effect,
    #[serde(rename = "Principal", default)]
    principal: Option<RawPrincipal>,
    #[serde(rename = "NotPrincipal", default)]
    not_principal: Option<RawPrincipal>,
    #[serde(rename = "Action", default)]
    action: Option<OneOrMany<String>>,
    #[serde(rename = "NotAction", default)]
    not_action: Option<OneOrMany<String>>,
    #[serde(rename = "Resource", default)]
    resource: Option<OneOrMany<String>>,
    #[serde(rename = "NotResource", default)]
    not_resource: Option<OneOrMany<String>>,
    #[serde(rename = "Condition", default)]
    condition: BTreeMap<String, BTreeMap<String, OneOrMany<Value>>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrincipal {
    Wildcard(String),
    Map(RawPrincipalMap),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrincipalMap {
    #[serde(rename = "AWS", default)]
    aws: Option<OneOrMany<String>>,
    #[serde(rename = "CanonicalUser", default)]
    canonical_user: Option<OneOrMany<String>>,
    #[serde(rename = "Federated", default)]
    federated: Option<String>,
    #[serde(rename = "Service", default)]
    service: Option<OneOrMany<String>>,
}

impl TryFrom<RawStatement> for Statement {
    type Error = Error;

    fn try_from(raw: RawStatement) -> Result<Self> {
        let condition = raw
            .condition
            .into_iter()
            .map(|(operator, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, ConditionValue::try_from(value)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok((operator, entries))
            })
            .collect::<Result<ConditionMap>>()?;

        Ok(Self {
            sid: raw.sid,
            effect: raw.effect,
            principal: raw.principal.map(Principal::try_from).transpose()?,
            not_principal: raw.not_principal.map(Principal::try_from).transpose()?,
            action: raw.action.map(OneOrMany::into_vec).unwrap_or_default(),
            not_action: raw.not_action.map(OneOrMany::into_vec).unwrap_or_default(),
            resource: raw.resource.map(OneOrMany::into_vec).unwrap_or_default(),
            not_resource: raw.not_resource.map(OneOrMany::into_vec).unwrap_or_default(),
            condition,
        })
    }
}

impl TryFrom<RawPrincipal> for Principal {
    type Error = Error;

    fn try_from(raw: RawPrincipal) -> Result<Self> {
        match raw {
            RawPrincipal::Wildcard(w) if w == "*" => Ok(Self {
                allow_anon: true,
                ..Default::default()
            }),
            RawPrincipal::Wildcard(other) => Err(Error::InvalidPolicy(format!(
                r#"principal must be "*" or an object, got "{other}""#
            ))),
            RawPrincipal::Map(map) => Ok(Self {
                allow_anon: false,
                aws: map.aws.map(OneOrMany::into_vec).unwrap_or_default(),
                canonical_user: map
                    .canonical_user
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default(),
                federated: map.federated,
                service: map.service.map(OneOrMany::into_vec).unwrap_or_default(),
            }),
        }
    }
}

impl TryFrom<OneOrMany<Value>> for ConditionValue {
    type Error = Error;

    fn try_from(raw: OneOrMany<Value>) -> Result<Self> {
        match raw {
            OneOrMany::One(value) => Ok(Self::Scalar(condition_scalar(value)?)),
            OneOrMany::Many(values) => Ok(Self::List(
                values
                    .into_iter()
                    .map(condition_scalar)
                    .collect::<Result<_>>()?,
            )),
        }
    }
}

// The provider stringifies booleans and numbers in conditions
fn condition_scalar(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::InvalidPolicy(format!(
            "unsupported condition value {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use indoc::indoc;
    use serde_json::json;

    use super::*;

    const PUBLISH: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":["a","b"]},"Action":"sns:Publish","Resource":"*"}]}"#;

    #[test]
    fn reordered_and_reformatted_principals_are_equal() {
        let observed = indoc! {r#"
            {
              "Version" : "2012-10-17",
              "Statement" : [ {
                "Effect" : "Allow",
                "Principal" : { "AWS" : [ "b", "a" ] },
                "Action" : "sns:Publish",
                "Resource" : "*"
              } ]
            }
        "#};

        assert!(documents_equal(PUBLISH, observed).unwrap());
    }

    #[test]
    fn single_statement_object_is_normalized_to_a_list() {
        let single = r#"{"Version":"2012-10-17","Statement":{"Effect":"Deny","Action":["sns:Subscribe"],"Resource":"*"}}"#;
        let list = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Deny","Action":"sns:Subscribe","Resource":["*"]}]}"#;

        let policy = Policy::parse(single).unwrap();
        assert_eq!(policy.statements.len(), 1);
        assert_eq!(policy.statements[0].effect, Effect::Deny);
        assert!(documents_equal(single, list).unwrap());
    }

    #[test]
    fn boolean_conditions_match_their_stringified_form() {
        let desired = indoc! {r#"
            {"Version":"2012-10-17","Statement":[{"Effect":"Deny","Principal":"*","Action":"sns:Publish",
              "Condition":{"Bool":{"aws:SecureTransport":false},"NumericLessThan":{"s3:max-keys":10}}}]}
        "#};
        let observed = indoc! {r#"
            {"Version":"2012-10-17","Statement":[{"Effect":"Deny","Principal":"*","Action":"sns:Publish",
              "Condition":{"NumericLessThan":{"s3:max-keys":"10"},"Bool":{"aws:SecureTransport":"false"}}}]}
        "#};

        assert!(documents_equal(desired, observed).unwrap());
    }

    #[test]
    fn condition_lists_compare_as_sets() {
        let desired = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"sns:Publish","Condition":{"StringEquals":{"aws:SourceAccount":["1","2"],"aws:SourceOwner":["3"]}}}]}"#;
        let observed = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"sns:Publish","Condition":{"StringEquals":{"aws:SourceOwner":"3","aws:SourceAccount":["2","1"]}}}]}"#;

        assert!(documents_equal(desired, observed).unwrap());
    }

    #[test]
    fn action_order_is_significant() {
        let desired = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["sns:Publish","sns:Subscribe"]}]}"#;
        let observed = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":["sns:Subscribe","sns:Publish"]}]}"#;

        assert!(!documents_equal(desired, observed).unwrap());
    }

    #[test]
    fn statement_order_is_significant() {
        let desired = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Action":"a"},{"Effect":"Deny","Action":"b"}]}"#;
        let observed = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Deny","Action":"b"},{"Effect":"Allow","Action":"a"}]}"#;

        assert!(!documents_equal(desired, observed).unwrap());
    }

    #[test]
    fn version_and_id_must_match() {
        let a = r#"{"Version":"2012-10-17","Id":"one","Statement":[]}"#;
        let b = r#"{"Version":"2012-10-17","Id":"two","Statement":[]}"#;
        let c = r#"{"Version":"2008-10-17","Id":"one","Statement":[]}"#;

        assert!(!documents_equal(a, b).unwrap());
        assert!(!documents_equal(a, c).unwrap());
    }

    #[test]
    fn wildcard_principal_allows_anonymous() {
        let policy = Policy::parse(
            r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":"*","Action":"sns:Publish"}]}"#,
        )
        .unwrap();

        let principal = policy.statements[0].principal.as_ref().unwrap();
        assert!(principal.allow_anon);
        assert!(principal.aws.is_empty());
    }

    #[test]
    fn canonical_user_principals_take_part_in_comparison() {
        let with_user = |users: &str| {
            format!(
                r#"{{"Version":"2012-10-17","Statement":[{{"Effect":"Allow","Principal":{{"AWS":"a","CanonicalUser":{users}}},"Action":"sns:Publish"}}]}}"#
            )
        };
        let without = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"AWS":"a"},"Action":"sns:Publish"}]}"#;

        assert!(!documents_equal(&with_user(r#""c1""#), without).unwrap());
        assert!(!documents_equal(&with_user(r#""c1""#), &with_user(r#""c2""#)).unwrap());
        assert!(documents_equal(&with_user(r#"["c2","c1"]"#), &with_user(r#"["c1","c2"]"#)).unwrap());

        let principal = Policy::parse(&with_user(r#"["c2","c1"]"#)).unwrap().canonicalize().statements[0]
            .principal
            .clone()
            .unwrap();
        assert_eq!(principal.canonical_user, vec!["c1", "c2"]);
    }

    #[test]
    fn unknown_principal_keys_are_rejected() {
        let policy = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Someone":"x"},"Action":"sns:Publish"}]}"#;

        assert!(matches!(Policy::parse(policy), Err(Error::InvalidPolicy(_))));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            Policy::parse("{not json"),
            Err(Error::InvalidPolicy(_))
        ));
        assert!(matches!(
            Policy::parse(r#"{"Statement":[{"Effect":"Allow","Principal":"someone"}]}"#),
            Err(Error::InvalidPolicy(_))
        ));
        assert!(matches!(
            documents_equal(PUBLISH, "42"),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn empty_documents() {
        assert!(documents_equal("", "  ").unwrap());
        assert!(!documents_equal(PUBLISH, "").unwrap());
    }

    #[test]
    fn canonical_json() {
        let policy = Policy::parse(indoc! {r#"
            {
              "Version": "2012-10-17",
              "Id": "topic-policy",
              "Statement": [{
                "Sid": "publish",
                "Effect": "Allow",
                "Principal": {"Service": ["s3.amazonaws.com"], "AWS": ["b", "a", "b"]},
                "Action": ["sns:Publish"],
                "Resource": "arn:aws:sns:eu-central-1:123456789012:orders",
                "Condition": {"ArnLike": {"aws:SourceArn": ["arn:aws:s3:::bucket"]}}
              }]
            }
        "#})
        .unwrap();

        let rendered: Value = serde_json::from_str(&policy.to_json()).unwrap();
        assert_json_eq!(
            rendered,
            json!({
                "Version": "2012-10-17",
                "Id": "topic-policy",
                "Statement": [{
                    "Sid": "publish",
                    "Effect": "Allow",
                    "Principal": {"AWS": ["a", "b"], "Service": "s3.amazonaws.com"},
                    "Action": "sns:Publish",
                    "Resource": "arn:aws:sns:eu-central-1:123456789012:orders",
                    "Condition": {"ArnLike": {"aws:SourceArn": "arn:aws:s3:::bucket"}}
                }]
            })
        );
    }

    #[test]
    fn serialized_policies_parse_back_equivalent() {
        let policy = Policy::parse(indoc! {r#"
            {"Version":"2012-10-17","Statement":[
              {"Sid":"1","Effect":"Allow","NotPrincipal":{"Federated":"cognito-identity.amazonaws.com"},
               "NotAction":["sns:DeleteTopic","sns:AddPermission"],"NotResource":"arn:x"},
              {"Effect":"Deny","Principal":"*","Action":"*",
               "Condition":{"IpAddress":{"aws:SourceIp":["10.0.0.0/8","192.168.0.0/16"]}}}
            ]}
        "#})
        .unwrap();

        let reparsed = Policy::parse(&policy.to_json()).unwrap();
        assert!(reparsed.equivalent(&policy));
        assert_eq!(reparsed.canonicalize(), policy.canonicalize());
    }
}
