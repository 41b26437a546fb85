/// Delivers password-reset instructions to a registered email address.
pub trait Mailer: Send + Sync {
    /// Returns the acknowledgment shown to the user.
    fn send_password_reset(&self, to_email: &str) -> String;
}

/// Acknowledges reset requests without sending anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedMailer;

impl Mailer for SimulatedMailer {
    fn send_password_reset(&self, to_email: &str) -> String {
        info!("Password reset requested for {} (simulated, not delivered)", to_email);
        format!("Instructions sent to {} (simulated).", to_email)
    }
}
