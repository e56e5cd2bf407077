//! tests/transport_tests.rs
//! Fallos de `SmtpMailTransport` que se detectan antes de hablar con el servidor.

#[cfg(test)]
mod tests {
    use actix_rt::test;

    use crate::config::mailing_config::MailingConfig;
    use crate::services::transport::{MailTransport, SmtpMailTransport, TransportError};

    fn local_transport() -> SmtpMailTransport {
        // localhost: builder_dangerous, no abre conexión al construir
        SmtpMailTransport::new(&MailingConfig::default().smtp).unwrap()
    }

    #[test]
    async fn empty_recipient_list_is_rejected() {
        let transport = local_transport();
        let err = transport
            .deliver("noreply@localhost", "Hola", "Texto", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::NoRecipients));
        assert_eq!(err.to_string(), "el mailing no tiene destinatarios");
    }

    #[test]
    async fn invalid_sender_is_an_address_error() {
        let transport = local_transport();
        let err = transport
            .deliver(
                "sin arroba",
                "Hola",
                "Texto",
                &["ana@example.com".to_string()],
            )
            .await
            .unwrap_err();

        match err {
            TransportError::Address { address, .. } => assert_eq!(address, "sin arroba"),
            other => panic!("se esperaba Address, llegó {other:?}"),
        }
    }

    #[test]
    async fn one_invalid_recipient_stops_the_whole_delivery() {
        let transport = local_transport();
        let err = transport
            .deliver(
                "Mailing Service <noreply@localhost>",
                "Hola",
                "Texto",
                &["ana@example.com".to_string(), "not-an-email".to_string()],
            )
            .await
            .unwrap_err();

        match err {
            TransportError::Address { address, .. } => assert_eq!(address, "not-an-email"),
            other => panic!("se esperaba Address, llegó {other:?}"),
        }
    }
}
