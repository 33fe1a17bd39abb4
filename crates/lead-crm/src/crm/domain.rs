use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::CrmError;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const ENTITY: &'static str = $entity;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a lead in the sales pipeline.
    LeadId,
    "lead"
);
record_id!(CourseId, "course");
record_id!(EnrollmentId, "enrollment");
record_id!(UserId, "user");
record_id!(
    /// Identifier of an immutable audit row.
    LeadLogId,
    "lead log"
);

/// Pipeline status of a lead. Exactly one applies at any time.
///
/// Decoding accepts the wire labels in any letter case, matching [`LeadStatus::from_label`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LeadStatus {
    #[default]
    New,
    Open,
    Average,
    Followup,
    Interested,
    #[serde(rename = "inProgress")]
    InProgress,
    Active,
    Converted,
    Lost,
    Junk,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 10] = [
        LeadStatus::New,
        LeadStatus::Open,
        LeadStatus::Average,
        LeadStatus::Followup,
        LeadStatus::Interested,
        LeadStatus::InProgress,
        LeadStatus::Active,
        LeadStatus::Converted,
        LeadStatus::Lost,
        LeadStatus::Junk,
    ];

    /// Statuses that place a lead in the trash.
    pub const TRASH: [LeadStatus; 2] = [LeadStatus::Lost, LeadStatus::Junk];

    /// Statuses hidden from the default active lead listing.
    pub const INACTIVE: [LeadStatus; 3] =
        [LeadStatus::Converted, LeadStatus::Lost, LeadStatus::Junk];

    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Open => "Open",
            LeadStatus::Average => "Average",
            LeadStatus::Followup => "Followup",
            LeadStatus::Interested => "Interested",
            LeadStatus::InProgress => "inProgress",
            LeadStatus::Active => "Active",
            LeadStatus::Converted => "Converted",
            LeadStatus::Lost => "Lost",
            LeadStatus::Junk => "Junk",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(raw))
    }

    pub const fn is_trash(self) -> bool {
        matches!(self, LeadStatus::Lost | LeadStatus::Junk)
    }
}

const LEAD_STATUS_LABELS: &[&str] = &[
    "New",
    "Open",
    "Average",
    "Followup",
    "Interested",
    "inProgress",
    "Active",
    "Converted",
    "Lost",
    "Junk",
];

impl<'de> Deserialize<'de> for LeadStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        LeadStatus::from_label(&raw)
            .ok_or_else(|| serde::de::Error::unknown_variant(&raw, LEAD_STATUS_LABELS))
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Channel the lead arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadSource {
    #[serde(rename = "WhatsApp/Viber")]
    WhatsAppViber,
    Facebook,
    Website,
    Email,
    #[serde(rename = "Office Visit")]
    OfficeVisit,
    #[serde(rename = "Direct Call")]
    DirectCall,
    LinkedIn,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassType {
    Physical,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Cash,
    Online,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cheque,
}

/// Whether the student has a device for classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAccess {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingExperience {
    None,
    #[serde(rename = "Basic Python")]
    BasicPython,
    #[serde(rename = "Intermediate C++")]
    IntermediateCpp,
    Arduino,
    #[serde(rename = "Some Linux")]
    SomeLinux,
    #[serde(rename = "Advanced Python")]
    AdvancedPython,
    #[serde(rename = "Basic Java")]
    BasicJava,
    Other,
}

/// Contact and qualification details captured for a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadProfile {
    pub parents_name: String,
    pub student_name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub whatsapp_number: String,
    pub age: String,
    pub grade: String,
    pub source: Option<LeadSource>,
    pub class_type: Option<ClassType>,
    pub shift: String,
    pub previous_coding_experience: Option<CodingExperience>,
    pub value: String,
    pub adset_name: String,
    pub payment_type: Option<PaymentType>,
    pub device: Option<DeviceAccess>,
    pub workshop_batch: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub county: String,
    pub post_code: String,
}

impl LeadProfile {
    pub fn validate(&self) -> Result<(), CrmError> {
        check_length("parents_name", &self.parents_name, 255)?;
        check_length("student_name", &self.student_name, 255)?;
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        check_length("phone_number", &self.phone_number, 30)?;
        check_length("whatsapp_number", &self.whatsapp_number, 30)?;
        check_length("age", &self.age, 30)?;
        check_length("grade", &self.grade, 30)?;
        check_length("shift", &self.shift, 50)?;
        check_length("value", &self.value, 50)?;
        check_length("adset_name", &self.adset_name, 100)?;
        check_length("workshop_batch", &self.workshop_batch, 100)?;
        check_length("address_line_1", &self.address_line_1, 255)?;
        check_length("address_line_2", &self.address_line_2, 255)?;
        check_length("city", &self.city, 100)?;
        check_length("county", &self.county, 100)?;
        check_length("post_code", &self.post_code, 20)
    }
}

/// A prospective customer tracked through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub status: LeadStatus,
    #[serde(flatten)]
    pub profile: LeadProfile,
    pub course: Option<CourseId>,
    pub last_call: Option<NaiveDate>,
    pub next_call: Option<NaiveDate>,
    pub remarks: String,
    pub created_by: Option<UserId>,
    /// Bumped on every committed write; stores reject updates built on an older one.
    pub revision: u64,
    pub add_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn is_converted(&self) -> bool {
        self.status == LeadStatus::Converted
    }

    pub fn in_trash(&self) -> bool {
        self.status.is_trash()
    }
}

/// Create request for a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLead {
    pub status: LeadStatus,
    #[serde(flatten)]
    pub profile: LeadProfile,
    pub course: Option<CourseId>,
    pub last_call: Option<NaiveDate>,
    pub next_call: Option<NaiveDate>,
    pub remarks: String,
}

/// Partial update of a lead. Absent fields are left untouched; nullable fields use a
/// nested option so an explicit `null` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub course: Option<Option<CourseId>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_call: Option<Option<NaiveDate>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_call: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(flatten)]
    pub profile: LeadProfilePatch,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<Option<LeadSource>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub class_type: Option<Option<ClassType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_coding_experience: Option<Option<CodingExperience>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_name: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_type: Option<Option<PaymentType>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub device: Option<Option<DeviceAccess>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workshop_batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_code: Option<String>,
}

impl LeadProfilePatch {
    pub fn apply(self, profile: &mut LeadProfile) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut profile.parents_name, self.parents_name);
        set(&mut profile.student_name, self.student_name);
        set(&mut profile.email, self.email);
        set(&mut profile.phone_number, self.phone_number);
        set(&mut profile.whatsapp_number, self.whatsapp_number);
        set(&mut profile.age, self.age);
        set(&mut profile.grade, self.grade);
        set(&mut profile.source, self.source);
        set(&mut profile.class_type, self.class_type);
        set(&mut profile.shift, self.shift);
        set(
            &mut profile.previous_coding_experience,
            self.previous_coding_experience,
        );
        set(&mut profile.value, self.value);
        set(&mut profile.adset_name, self.adset_name);
        set(&mut profile.payment_type, self.payment_type);
        set(&mut profile.device, self.device);
        set(&mut profile.workshop_batch, self.workshop_batch);
        set(&mut profile.address_line_1, self.address_line_1);
        set(&mut profile.address_line_2, self.address_line_2);
        set(&mut profile.city, self.city);
        set(&mut profile.county, self.county);
        set(&mut profile.post_code, self.post_code);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub course_name: String,
}

/// Commercial record derived from a converted lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub lead: LeadId,
    /// Course captured when the lead converted; later lead edits do not touch it.
    pub course: Option<CourseId>,
    /// Amounts are in minor currency units.
    pub total_payment: Option<u64>,
    pub first_installment: Option<u64>,
    pub second_installment: Option<u64>,
    pub third_installment: Option<u64>,
    pub last_pay_date: Option<NaiveDate>,
    pub payment_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment bookkeeping edits. Plain field writes, no lifecycle rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentPatch {
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_payment: Option<Option<u64>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_installment: Option<Option<u64>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub second_installment: Option<Option<u64>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub third_installment: Option<Option<u64>>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_pay_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    SalesRep,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::SalesRep => "sales_rep",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Role::Superadmin => "Super Admin",
            Role::Admin => "Admin",
            Role::SalesRep => "Sales Representative",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Authenticated principal performing a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

/// Marks a field as present even when its value is `null`.
fn deserialize_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub(crate) fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), CrmError> {
    let length = value.chars().count();
    if length > max {
        return Err(CrmError::validation(
            field,
            format!("ensure this field has no more than {max} characters (found {length})"),
        ));
    }
    Ok(())
}

pub(crate) fn check_email(value: &str) -> Result<(), CrmError> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(CrmError::validation("email", "enter a valid email address"));
    }
    check_length("email", trimmed, 254)
}
