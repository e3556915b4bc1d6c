//! Rendering of the "who did you draw" message.

use xbuddy_core::types::ParticipantId;

use crate::task::OutboundMessage;

/// Display name used in the "From" header of every notification.
pub const SENDER_DISPLAY_NAME: &str = "X Buddy";

/// Link to a participant's personal page on the frontend.
pub fn participant_url(frontend_url: &str, participant_id: ParticipantId) -> String {
    format!(
        "{}/participant/{participant_id}",
        frontend_url.trim_end_matches('/')
    )
}

/// Data needed to tell one giver who they drew.
#[derive(Debug, Clone)]
pub struct AssignmentNotice<'a> {
    pub giver_name: &'a str,
    pub receiver_name: &'a str,
    pub group_name: &'a str,
    pub participant_url: &'a str,
}

impl AssignmentNotice<'_> {
    pub fn subject(&self) -> String {
        format!("Draw result for group {}", self.group_name)
    }

    /// Render the message for delivery to `to`.
    pub fn render(&self, to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            subject: self.subject(),
            html_body: self.html_body(),
            text_body: self.text_body(),
        }
    }

    fn text_body(&self) -> String {
        format!(
            "Hi {giver},\n\n\
             The draw for group {group} is done. You are getting a gift for:\n\n\
             \x20   {receiver}\n\n\
             See their wish list and details on your X Buddy page:\n\
             {url}\n\n\
             Save this link for later visits, and keep it a secret!\n",
            giver = self.giver_name,
            group = self.group_name,
            receiver = self.receiver_name,
            url = self.participant_url,
        )
    }

    fn html_body(&self) -> String {
        let giver = escape_html(self.giver_name);
        let group = escape_html(self.group_name);
        let receiver = escape_html(self.receiver_name);
        let url = escape_html(self.participant_url);

        format!(
            r#"<div style="font-family: Arial, sans-serif;">
  <h1>X Buddy draw result</h1>
  <p>Hi {giver},</p>
  <p>The draw for group {group} is done. You are getting a gift for:</p>
  <h2 style="color: #00B100; text-align: center; padding: 20px;">{receiver}</h2>
  <p>See their wish list and details on your X Buddy page:</p>
  <p style="text-align: center;">
    <a href="{url}" style="background-color: #00B100; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">Open my X Buddy page</a>
  </p>
  <p>Save this link for later visits: <br><a href="{url}">{url}</a></p>
  <p>Please keep it a secret and help your friend enjoy the surprise!</p>
</div>
"#
        )
    }
}

/// Escape text for inclusion in HTML element content or quoted attributes.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
