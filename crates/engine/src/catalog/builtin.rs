//! Built-in search parameter table.
//!
//! Element paths are dotted paths into resource JSON; arrays along the way are
//! traversed implicitly. Choice elements list every concrete variant.

use crate::types::SearchParamType::{Date, Number, Quantity, Reference, String, Token, Uri};

use super::definition::ParameterDefinition;
use super::registry::{CatalogBuilder, CatalogError};

type Def = ParameterDefinition;

/// Registers every built-in resource type.
pub(crate) fn register_all(builder: CatalogBuilder) -> Result<CatalogBuilder, CatalogError> {
    builder
        .register_all("Patient", patient())?
        .register_all("Practitioner", practitioner())?
        .register_all("Organization", organization())?
        .register_all("Encounter", encounter())?
        .register_all("Observation", observation())?
        .register_all("Condition", condition())?
        .register_all("Procedure", procedure())?
        .register_all("MedicationRequest", medication_request())?
        .register_all("DiagnosticReport", diagnostic_report())?
        .register_all("RiskAssessment", risk_assessment())
}

const EFFECTIVE: [&str; 3] = ["effectiveDateTime", "effectivePeriod", "effectiveInstant"];

fn patient() -> Vec<Def> {
    vec![
        Def::new("name", String, ["name"]),
        Def::new("family", String, ["name.family"]),
        Def::new("given", String, ["name.given"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("gender", Token, ["gender"]).single_valued(),
        Def::new("birthdate", Date, ["birthDate"]).single_valued(),
        Def::new("active", Token, ["active"]).single_valued(),
        Def::new("deceased", Token, ["deceasedBoolean"]).single_valued(),
        Def::new("telecom", Token, ["telecom"]),
        Def::new("address", String, ["address"]),
        Def::new("address-city", String, ["address.city"]),
        Def::new("address-postalcode", String, ["address.postalCode"]),
        Def::new("organization", Reference, ["managingOrganization"])
            .with_targets(["Organization"]),
        Def::new("general-practitioner", Reference, ["generalPractitioner"])
            .with_targets(["Practitioner", "Organization"]),
        Def::new("link", Reference, ["link.other"]).with_targets(["Patient"]),
    ]
}

fn practitioner() -> Vec<Def> {
    vec![
        Def::new("name", String, ["name"]),
        Def::new("family", String, ["name.family"]),
        Def::new("given", String, ["name.given"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("active", Token, ["active"]).single_valued(),
        Def::new("gender", Token, ["gender"]).single_valued(),
    ]
}

fn organization() -> Vec<Def> {
    vec![
        Def::new("name", String, ["name", "alias"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("type", Token, ["type"]),
        Def::new("active", Token, ["active"]).single_valued(),
        Def::new("address-city", String, ["address.city"]),
        Def::new("endpoint", Uri, ["endpoint.address"]),
        Def::new("partof", Reference, ["partOf"]).with_targets(["Organization"]),
    ]
}

fn encounter() -> Vec<Def> {
    vec![
        Def::new("status", Token, ["status"]).single_valued(),
        Def::new("class", Token, ["class"]),
        Def::new("type", Token, ["type"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("date", Date, ["period"]),
        Def::new("length", Quantity, ["length"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("participant", Reference, ["participant.individual"])
            .with_targets(["Practitioner"]),
        Def::new("service-provider", Reference, ["serviceProvider"])
            .with_targets(["Organization"]),
    ]
}

fn observation() -> Vec<Def> {
    vec![
        Def::new("status", Token, ["status"]).single_valued(),
        Def::new("code", Token, ["code"]),
        Def::new("category", Token, ["category"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("date", Date, EFFECTIVE),
        Def::new("subject", Reference, ["subject"])
            .with_targets(["Patient", "Practitioner", "Organization"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("encounter", Reference, ["encounter"]).with_targets(["Encounter"]),
        Def::new("performer", Reference, ["performer"])
            .with_targets(["Practitioner", "Organization", "Patient"]),
        Def::new("has-member", Reference, ["hasMember"]).with_targets(["Observation"]),
        Def::new("value-quantity", Quantity, ["valueQuantity"]),
        Def::new("value-string", String, ["valueString"]),
        Def::new("value-concept", Token, ["valueCodeableConcept"]),
        Def::new("value-date", Date, ["valueDateTime", "valuePeriod"]),
        Def::new("component-code", Token, ["component.code"]),
        Def::new("component-value-quantity", Quantity, ["component.valueQuantity"]),
        Def::composite(
            "component-code-value-quantity",
            "component",
            vec![
                Def::new("code", Token, ["code"]),
                Def::new("value", Quantity, ["valueQuantity"]),
            ],
        ),
        Def::composite(
            "code-value-quantity",
            "",
            vec![
                Def::new("code", Token, ["code"]),
                Def::new("value", Quantity, ["valueQuantity"]),
            ],
        ),
        Def::composite(
            "code-value-concept",
            "",
            vec![
                Def::new("code", Token, ["code"]),
                Def::new("value", Token, ["valueCodeableConcept"]),
            ],
        ),
    ]
}

fn condition() -> Vec<Def> {
    vec![
        Def::new("code", Token, ["code"]),
        Def::new("clinical-status", Token, ["clinicalStatus"]),
        Def::new("verification-status", Token, ["verificationStatus"]),
        Def::new("category", Token, ["category"]),
        Def::new("severity", Token, ["severity"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("onset-date", Date, ["onsetDateTime", "onsetPeriod"]),
        Def::new("recorded-date", Date, ["recordedDate"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("encounter", Reference, ["encounter"]).with_targets(["Encounter"]),
        Def::new("asserter", Reference, ["asserter"])
            .with_targets(["Practitioner", "Patient"]),
    ]
}

fn procedure() -> Vec<Def> {
    vec![
        Def::new("code", Token, ["code"]),
        Def::new("status", Token, ["status"]).single_valued(),
        Def::new("category", Token, ["category"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("date", Date, ["performedDateTime", "performedPeriod"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("encounter", Reference, ["encounter"]).with_targets(["Encounter"]),
        Def::new("performer", Reference, ["performer.actor"])
            .with_targets(["Practitioner", "Organization"]),
    ]
}

fn medication_request() -> Vec<Def> {
    vec![
        Def::new("status", Token, ["status"]).single_valued(),
        Def::new("intent", Token, ["intent"]).single_valued(),
        Def::new("code", Token, ["medicationCodeableConcept"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("authoredon", Date, ["authoredOn"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("encounter", Reference, ["encounter"]).with_targets(["Encounter"]),
        Def::new("requester", Reference, ["requester"])
            .with_targets(["Practitioner", "Organization"]),
    ]
}

fn diagnostic_report() -> Vec<Def> {
    vec![
        Def::new("code", Token, ["code"]),
        Def::new("status", Token, ["status"]).single_valued(),
        Def::new("category", Token, ["category"]),
        Def::new("identifier", Token, ["identifier"]),
        Def::new("date", Date, EFFECTIVE),
        Def::new("issued", Date, ["issued"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("encounter", Reference, ["encounter"]).with_targets(["Encounter"]),
        Def::new("result", Reference, ["result"]).with_targets(["Observation"]),
        Def::new("performer", Reference, ["performer"])
            .with_targets(["Practitioner", "Organization"]),
    ]
}

fn risk_assessment() -> Vec<Def> {
    vec![
        Def::new("probability", Number, ["prediction.probabilityDecimal"]),
        Def::new("date", Date, ["occurrenceDateTime", "occurrencePeriod"]),
        Def::new("subject", Reference, ["subject"]).with_targets(["Patient"]),
        Def::new("patient", Reference, ["subject"]).with_targets(["Patient"]),
    ]
}
