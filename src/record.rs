//! Parcel ledger data model.
//!
//! One [`ParcelRecord`] per physical parcel. The serde renames define the
//! flat-file column header names; field order must match [`COLUMNS`].

use serde::{Deserialize, Deserializer, Serialize};

/// Fixed column set of the ledger file, in serialization order.
pub const COLUMNS: [&str; 15] = [
    "S.No",
    "Label ID",
    "Roll No",
    "Name",
    "Company",
    "AWB No",
    "Email",
    "Phone No",
    "Time",
    "Parcel No",
    "Picked",
    "Signature",
    "Status",
    "Mail Status",
    "Mail Time",
];

pub const PICKED_DEFAULT: &str = "Not Picked";
pub const STATUS_PENDING: &str = "Pending";
pub const MAIL_PENDING: &str = "Pending";
pub const MAIL_SENT: &str = "Sent";

/// One row of the ledger. Every field except the sequence number is a
/// free-form string; missing columns on read default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    #[serde(rename = "S.No", default, deserialize_with = "serial_or_zero")]
    pub serial: u32,
    #[serde(rename = "Label ID", default)]
    pub label_id: String,
    #[serde(rename = "Roll No", default)]
    pub roll_no: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Company", default)]
    pub company: String,
    #[serde(rename = "AWB No", default)]
    pub awb: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Phone No", default)]
    pub phone: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Parcel No", default)]
    pub parcel_no: String,
    #[serde(rename = "Picked", default)]
    pub picked: String,
    #[serde(rename = "Signature", default)]
    pub signature: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Mail Status", default)]
    pub mail_status: String,
    #[serde(rename = "Mail Time", default)]
    pub mail_time: String,
}

impl ParcelRecord {
    /// Apply a caller-supplied edit by column name. The sequence number is
    /// managed by the ledger and cannot be edited; unknown columns are
    /// ignored. Returns whether the column was recognized.
    pub fn set_field(&mut self, column: &str, value: &str) -> bool {
        let slot = match column {
            "Label ID" => &mut self.label_id,
            "Roll No" => &mut self.roll_no,
            "Name" => &mut self.name,
            "Company" => &mut self.company,
            "AWB No" => &mut self.awb,
            "Email" => &mut self.email,
            "Phone No" => &mut self.phone,
            "Time" => &mut self.time,
            "Parcel No" => &mut self.parcel_no,
            "Picked" => &mut self.picked,
            "Signature" => &mut self.signature,
            "Status" => &mut self.status,
            "Mail Status" => &mut self.mail_status,
            "Mail Time" => &mut self.mail_time,
            _ => return false,
        };
        *slot = value.to_string();
        true
    }
}

/// Hand-edited ledgers sometimes carry a blank sequence cell; treat it as 0
/// rather than failing the whole read.
fn serial_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or(0))
}
