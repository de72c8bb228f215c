//! Contacts: local clients <-> directory people.

use super::{non_blank, wrong_kind};
use crate::{ClientFields, LocalFields, RemoteRecord, ResourceType, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Person fields requested from and written to the directory.
pub const PERSON_FIELDS: &str = "names,emailAddresses,phoneNumbers,organizations,metadata";

/// Person fields replaced by an update.
pub const UPDATE_PERSON_FIELDS: &str = "names,emailAddresses,phoneNumbers,organizations";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub names: Vec<Name>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PersonMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstructured_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumber {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadata {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
}

/// The client as the directory keeps it: runs of whitespace in the name
/// collapse to one space, optional fields are trimmed and blank ones dropped.
/// A created contact maps back to exactly this.
pub fn normalize(fields: &ClientFields) -> ClientFields {
    ClientFields {
        name: fields.name.split_whitespace().collect::<Vec<_>>().join(" "),
        email: non_blank(fields.email.as_deref()),
        phone: non_blank(fields.phone.as_deref()),
        company: non_blank(fields.company.as_deref()),
    }
}

/// Build the person payload for a client.
///
/// The normalized name is split at the first space into given and family
/// parts; email, phone and company become typed entries only when present.
pub fn to_remote(fields: &ClientFields) -> Person {
    let fields = normalize(fields);
    let mut person = Person::default();

    if !fields.name.is_empty() {
        let (given, family) = match fields.name.split_once(' ') {
            Some((given, family)) => (given, Some(family.to_string())),
            None => (fields.name.as_str(), None),
        };
        person.names.push(Name {
            given_name: Some(given.to_string()),
            family_name: family,
            ..Default::default()
        });
    }

    if let Some(email) = fields.email {
        person.email_addresses.push(EmailAddress {
            value: Some(email),
            kind: Some("work".into()),
        });
    }
    if let Some(phone) = fields.phone {
        person.phone_numbers.push(PhoneNumber {
            value: Some(phone),
            kind: Some("work".into()),
        });
    }
    if let Some(company) = fields.company {
        person.organizations.push(Organization {
            name: Some(company),
            title: None,
        });
    }

    person
}

/// Validate the field kind, then build the person payload.
pub fn to_remote_fields(fields: &LocalFields) -> Result<Person> {
    match fields {
        LocalFields::Client(client) => Ok(to_remote(client)),
        other => Err(wrong_kind(ResourceType::Contacts, other)),
    }
}

/// Map a person back to client fields. Missing parts stay absent.
pub fn to_local(person: &Person) -> ClientFields {
    let name = person.names.first().map(full_name).unwrap_or_default();

    ClientFields {
        name,
        email: person
            .email_addresses
            .iter()
            .find_map(|e| non_blank(e.value.as_deref())),
        phone: person
            .phone_numbers
            .iter()
            .find_map(|p| non_blank(p.value.as_deref())),
        company: person
            .organizations
            .iter()
            .find_map(|o| non_blank(o.name.as_deref())),
    }
}

fn full_name(name: &Name) -> String {
    let parts: Vec<&str> = [name.given_name.as_deref(), name.family_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if !parts.is_empty() {
        return parts.join(" ");
    }

    non_blank(name.display_name.as_deref())
        .or_else(|| non_blank(name.unstructured_name.as_deref()))
        .unwrap_or_default()
}

/// The contact-source modification time, if the directory reported one.
pub fn updated_at(person: &Person) -> Option<Timestamp> {
    let sources = &person.metadata.as_ref()?.sources;
    sources
        .iter()
        .filter(|s| s.kind.as_deref() == Some("CONTACT"))
        .filter_map(|s| s.update_time)
        .max()
}

/// Wrap a person as a remote record. Requires a resource name and an etag.
pub fn into_record(person: Person) -> Option<RemoteRecord> {
    let remote_id = person.resource_name.clone()?;
    let version_tag = person.etag.clone()?;
    let updated_at = updated_at(&person);
    let deleted = person.metadata.as_ref().is_some_and(|m| m.deleted);
    let raw = serde_json::to_value(&person).ok()?;

    Some(RemoteRecord {
        remote_id,
        version_tag,
        updated_at,
        deleted,
        raw,
    })
}
