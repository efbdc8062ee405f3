use serde::Serialize;

pub const LOGIN_ACTION_ID: &str = "open_login_modal";
pub const LOGIN_CALLBACK_ID: &str = "login_form";
pub const USERNAME_BLOCK_ID: &str = "username_block";
pub const USERNAME_ACTION_ID: &str = "username_input";
pub const PASSWORD_BLOCK_ID: &str = "password_block";
pub const PASSWORD_ACTION_ID: &str = "password_input";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Button(ButtonElement),
    PlainTextInput { action_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<Element> },
    Context { block_id: String, elements: Vec<TextObject> },
    Input { block_id: String, element: Element, label: TextObject },
}

/// A chat message: plain fallback text plus optional Block Kit layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<Element>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(Element::Button(button));
        self
    }

    fn build(self) -> Vec<Element> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub callback_id: String,
    pub title: TextObject,
    pub submit: TextObject,
    pub private_metadata: String,
    pub blocks: Vec<Block>,
}

/// Shown to Slack users with no linked AWX account.
pub fn login_prompt(slack_user_id: &str) -> MessageTemplate {
    let text = format!("<@{slack_user_id}> Please log in with your AWX account to continue.");
    MessageBuilder::new(text.clone())
        .section("login.prompt.v1", |section| {
            section.mrkdwn(text);
        })
        .actions("login.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(LOGIN_ACTION_ID, "Login")
                    .style(ButtonStyle::Primary)
                    .value("login_request"),
            );
        })
        .build()
}

/// Credential form. The originating channel rides along in
/// `private_metadata` so the outcome can be posted back there.
pub fn login_modal(channel_id: &str) -> ModalView {
    ModalView {
        kind: "modal",
        callback_id: LOGIN_CALLBACK_ID.to_string(),
        title: TextObject::plain("Login to AWX"),
        submit: TextObject::plain("Login"),
        private_metadata: channel_id.to_string(),
        blocks: vec![
            Block::Input {
                block_id: USERNAME_BLOCK_ID.to_string(),
                element: Element::PlainTextInput { action_id: USERNAME_ACTION_ID.to_string() },
                label: TextObject::plain("Username"),
            },
            Block::Input {
                block_id: PASSWORD_BLOCK_ID.to_string(),
                element: Element::PlainTextInput { action_id: PASSWORD_ACTION_ID.to_string() },
                label: TextObject::plain("Password"),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{login_modal, login_prompt, MessageTemplate, LOGIN_ACTION_ID};

    #[test]
    fn login_prompt_carries_login_button() {
        let message = login_prompt("U123");
        let rendered = serde_json::to_value(&message).expect("serialize");

        assert!(message.fallback_text.starts_with("<@U123>"));
        assert_eq!(rendered["blocks"][0]["type"], json!("section"));
        assert_eq!(rendered["blocks"][0]["text"]["type"], json!("mrkdwn"));
        let button = &rendered["blocks"][1]["elements"][0];
        assert_eq!(button["type"], json!("button"));
        assert_eq!(button["action_id"], json!(LOGIN_ACTION_ID));
        assert_eq!(button["text"], json!({ "type": "plain_text", "text": "Login" }));
    }

    #[test]
    fn login_modal_matches_slack_view_shape() {
        let rendered = serde_json::to_value(login_modal("C42")).expect("serialize");

        assert_eq!(rendered["type"], json!("modal"));
        assert_eq!(rendered["callback_id"], json!("login_form"));
        assert_eq!(rendered["private_metadata"], json!("C42"));
        assert_eq!(
            rendered["blocks"][1],
            json!({
                "type": "input",
                "block_id": "password_block",
                "element": { "type": "plain_text_input", "action_id": "password_input" },
                "label": { "type": "plain_text", "text": "Password" }
            })
        );
    }

    #[test]
    fn plain_message_has_no_blocks() {
        let message = MessageTemplate::text("done");
        assert!(message.blocks.is_empty());
        assert_eq!(message.fallback_text, "done");
    }
}
