//! tests/model_tests.rs

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::dispatch_model::{MailingOutcome, PassKind, PassReport};
    use crate::models::mailing_model::{
        AttemptStatus, CreateMailingRequest, MailingStatus, Periodicity, RecipientRequest,
    };

    #[test]
    fn status_never_regresses() {
        use MailingStatus::*;
        assert!(Created.can_advance_to(Started));
        assert!(Created.can_advance_to(Completed));
        assert!(Started.can_advance_to(Completed));
        assert!(!Started.can_advance_to(Created));
        assert!(!Completed.can_advance_to(Started));
        assert!(!Started.can_advance_to(Started));
    }

    #[test]
    fn periodicity_parsing() {
        assert_eq!("daily".parse::<Periodicity>().unwrap(), Periodicity::Daily);
        assert_eq!("monthly".parse::<Periodicity>().unwrap().min_elapsed_days(), 30);
        let err = "Weekly".parse::<Periodicity>().unwrap_err();
        assert_eq!(err.to_string(), "periodicidad desconocida: 'Weekly'");
    }

    #[test]
    fn pass_report_counts_outcomes() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut report = PassReport::new(PassKind::Strict, now);
        report.push(
            "a",
            MailingOutcome::Sent {
                attempt_status: AttemptStatus::Success,
            },
        );
        report.push(
            "b",
            MailingOutcome::Sent {
                attempt_status: AttemptStatus::Failed,
            },
        );
        report.push("c", MailingOutcome::Completed);
        report.push("d", MailingOutcome::NotDue);
        report.push(
            "e",
            MailingOutcome::Error {
                message: "boom".to_string(),
            },
        );

        assert_eq!(
            report.summary(),
            "pass=strict mailings=5 sent=1 failed=1 completed=1 errors=1"
        );
        assert_eq!(report.outcome_for("d"), Some(&MailingOutcome::NotDue));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "strict");
        assert_eq!(json["entries"][0]["action"], "sent");
        assert_eq!(json["entries"][0]["attempt_status"], "success");
        assert_eq!(json["entries"][4]["message"], "boom");
    }

    #[test]
    fn create_request_validation() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut req = CreateMailingRequest {
            description: None,
            start_time: start,
            periodicity: Periodicity::Daily,
            actual_end_time: Some(start + Duration::days(1)),
            subject: "Hola".to_string(),
            body: None,
            recipients: vec![RecipientRequest {
                email: "a@x.com".to_string(),
                full_name: "A".to_string(),
                comment: None,
            }],
        };
        assert!(req.validate().is_ok());

        req.actual_end_time = Some(start);
        assert!(req.validate().is_err());

        req.actual_end_time = None;
        req.subject = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_request_rejects_bad_recipient_email() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let recipient = |email: &str| RecipientRequest {
            email: email.to_string(),
            full_name: "X".to_string(),
            comment: None,
        };
        let mut req = CreateMailingRequest {
            description: None,
            start_time: start,
            periodicity: Periodicity::Weekly,
            actual_end_time: None,
            subject: "Hola".to_string(),
            body: None,
            recipients: vec![recipient("good@example.com"), recipient("not-an-email")],
        };

        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("not-an-email"));

        req.recipients = vec![recipient("  good@example.com ")];
        assert!(req.validate().is_ok());
    }
}
