//! Batched arrival notifications over a pluggable mail transport.
//!
//! Records still pending notification are grouped by recipient email and
//! each recipient gets one message listing all of their waiting parcels.
//! Rows are marked Sent only after a confirmed send; the caller persists
//! the full store once after the whole batch. A crash after some sends but
//! before that persist loses the Sent markers for already-sent groups and
//! the operator resends — a known limitation of the single-persist design.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SmtpSettings;
use crate::record::{ParcelRecord, MAIL_SENT};

/// Email transport seam. The SMTP implementation is swapped for an
/// in-memory one in tests.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Outcome of one batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    /// Sequence numbers marked Sent this run.
    pub sent: Vec<u32>,
    pub failures: Vec<SendFailure>,
}

#[derive(Debug, Serialize)]
pub struct SendFailure {
    pub email: String,
    pub error: String,
}

/// Send one message per recipient with pending parcels, marking rows Sent
/// in place on confirmed success. Failures are collected per recipient and
/// never abort the remaining groups.
pub async fn send_pending_batch(
    rows: &mut [ParcelRecord],
    transport: &dyn MailTransport,
    now: &str,
) -> BatchReport {
    // Group pending rows by email in first-seen order.
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if row.mail_status == MAIL_SENT || row.email.trim().is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(email, _)| *email == row.email) {
            Some((_, indices)) => indices.push(index),
            None => groups.push((row.email.clone(), vec![index])),
        }
    }

    let mut report = BatchReport::default();
    for (email, indices) in groups {
        let (subject, body) = {
            let parcels: Vec<&ParcelRecord> = indices.iter().map(|&i| &rows[i]).collect();
            (
                format!("Parcel Arrival Notification - {} Package(s)", parcels.len()),
                compose_body(&parcels),
            )
        };
        match transport.send(&email, &subject, &body).await {
            Ok(()) => {
                info!("notified {} about {} parcel(s)", email, indices.len());
                for &index in &indices {
                    rows[index].mail_status = MAIL_SENT.to_string();
                    rows[index].mail_time = now.to_string();
                    report.sent.push(rows[index].serial);
                }
            }
            Err(e) => {
                warn!("notification to {} failed: {e:#}", email);
                report.failures.push(SendFailure {
                    email,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    report
}

fn compose_body(parcels: &[&ParcelRecord]) -> String {
    let mut body = format!(
        "Hello,\n\nYou have {} parcel(s) waiting for pickup at the reception desk.\n\n",
        parcels.len()
    );
    for parcel in parcels {
        body.push_str(&format!("--- Parcel {} ---\n", parcel.label_id));
        body.push_str(&format!("AWB: {}\n", parcel.awb));
        body.push_str(&format!("Courier: {}\n", parcel.company));
        body.push_str(&format!("Arrived: {}\n\n", parcel.time));
    }
    body.push_str("Please collect them at your earliest convenience.\n\nRegards,\nReception");
    body
}

/// SMTP transport over STARTTLS with an explicit send timeout.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .email
            .parse()
            .context("invalid SMTP_EMAIL address")?;
        let credentials =
            Credentials::new(settings.email.clone(), settings.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
            .context("invalid SMTP relay")?
            .port(settings.port)
            .credentials(credentials)
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self { from, transport })
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build message")?;
        self.transport
            .send(message)
            .await
            .context("smtp send failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockTransport {
        fail_for: Vec<String>,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl MockTransport {
        fn new(fail_for: &[&str]) -> Self {
            Self {
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl MailTransport for MockTransport {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.fail_for.iter().any(|f| f == to) {
                anyhow::bail!("connection refused");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn pending(serial: u32, email: &str, label: &str) -> ParcelRecord {
        ParcelRecord {
            serial,
            label_id: label.to_string(),
            email: email.to_string(),
            awb: "1234567890123".to_string(),
            company: "Ekart".to_string(),
            time: "2026-08-06 09:00:00".to_string(),
            mail_status: "Pending".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_groups_by_email_and_marks_sent() {
        let mut rows = vec![
            pending(1, "alice@example.com", "20260806-0001"),
            pending(2, "bob@example.com", "20260806-0002"),
            pending(3, "alice@example.com", "20260806-0003"),
        ];
        let transport = MockTransport::new(&[]);
        let report = send_pending_batch(&mut rows, &transport, "2026-08-06 12:00:00").await;

        // One message per distinct recipient.
        assert_eq!(transport.sent_count(), 2);
        assert_eq!(report.sent, vec![1, 3, 2]);
        assert!(report.failures.is_empty());
        for row in &rows {
            assert_eq!(row.mail_status, "Sent");
            assert_eq!(row.mail_time, "2026-08-06 12:00:00");
        }

        let sent = transport.sent.lock().unwrap();
        let (_, subject, body) = &sent[0];
        assert_eq!(subject, "Parcel Arrival Notification - 2 Package(s)");
        assert!(body.contains("20260806-0001"));
        assert!(body.contains("20260806-0003"));
        assert!(body.contains("AWB: 1234567890123"));
    }

    #[tokio::test]
    async fn test_second_run_sends_nothing() {
        let mut rows = vec![
            pending(1, "alice@example.com", "20260806-0001"),
            pending(2, "bob@example.com", "20260806-0002"),
        ];
        let transport = MockTransport::new(&[]);
        send_pending_batch(&mut rows, &transport, "2026-08-06 12:00:00").await;
        assert_eq!(transport.sent_count(), 2);

        let report = send_pending_batch(&mut rows, &transport, "2026-08-06 12:05:00").await;
        assert_eq!(transport.sent_count(), 2);
        assert!(report.sent.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_group_pending() {
        let mut rows = vec![
            pending(1, "alice@example.com", "20260806-0001"),
            pending(2, "broken@example.com", "20260806-0002"),
        ];
        let transport = MockTransport::new(&["broken@example.com"]);
        let report = send_pending_batch(&mut rows, &transport, "2026-08-06 12:00:00").await;

        assert_eq!(report.sent, vec![1]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].email, "broken@example.com");
        assert_eq!(rows[0].mail_status, "Sent");
        assert_eq!(rows[1].mail_status, "Pending");
        assert_eq!(rows[1].mail_time, "");
    }

    #[tokio::test]
    async fn test_skips_rows_without_email() {
        let mut rows = vec![pending(1, "", "20260806-0001")];
        let transport = MockTransport::new(&[]);
        let report = send_pending_batch(&mut rows, &transport, "2026-08-06 12:00:00").await;
        assert_eq!(transport.sent_count(), 0);
        assert!(report.sent.is_empty());
        assert_eq!(rows[0].mail_status, "Pending");
    }
}
