use serde::Serialize;

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

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
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
pub struct SelectOption {
    pub text: TextObject,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { text: TextObject::plain(label), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StaticSelectElement {
    pub action_id: String,
    pub placeholder: TextObject,
    pub options: Vec<SelectOption>,
}

impl StaticSelectElement {
    pub fn new(action_id: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            placeholder: TextObject::plain(placeholder),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, option: SelectOption) -> Self {
        self.options.push(option);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionElement {
    Button(ButtonElement),
    StaticSelect(StaticSelectElement),
}

impl ActionElement {
    pub fn action_id(&self) -> &str {
        match self {
            Self::Button(button) => &button.action_id,
            Self::StaticSelect(select) => &select.action_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        block_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
    },
    Actions { block_id: String, elements: Vec<ActionElement> },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

/// Attachment side bar colours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    LightGray,
    Crimson,
    DeepSkyBlue,
    Khaki,
}

impl Color {
    pub fn hex(&self) -> &'static str {
        match self {
            Self::LightGray => "#d3d3d3",
            Self::Crimson => "#dc143c",
            Self::DeepSkyBlue => "#00bfff",
            Self::Khaki => "#f0e68c",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
    pub color: Option<Color>,
}

impl MessageTemplate {
    /// Every text fragment in render order, joined by newlines.
    pub fn text_content(&self) -> String {
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Section { text, fields, .. } => {
                    lines.extend(text.iter().map(|text| text.text().to_owned()));
                    lines.extend(fields.iter().map(|field| field.text().to_owned()));
                }
                Block::Context { elements, .. } => {
                    lines.extend(elements.iter().map(|element| element.text().to_owned()));
                }
                Block::Actions { .. } | Block::Divider { .. } => {}
            }
        }
        lines.join("\n")
    }

    pub fn action_elements(&self) -> impl Iterator<Item = &ActionElement> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements),
                _ => None,
            })
            .flatten()
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.action_elements().filter_map(|element| match element {
            ActionElement::Button(button) => Some(button),
            ActionElement::StaticSelect(_) => None,
        })
    }

    pub fn select_options(&self) -> impl Iterator<Item = &SelectOption> {
        self.action_elements()
            .filter_map(|element| match element {
                ActionElement::StaticSelect(select) => Some(&select.options),
                ActionElement::Button(_) => None,
            })
            .flatten()
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
    color: Option<Color>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new(), color: None }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        let (text, fields) = builder.build();
        self.blocks.push(Block::Section { block_id: block_id.into(), text, fields });
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

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks, color: self.color }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
    fields: Vec<TextObject>,
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

    pub fn field(&mut self, text: impl Into<String>) -> &mut Self {
        self.fields.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> (Option<TextObject>, Vec<TextObject>) {
        if self.text.is_none() && self.fields.is_empty() {
            return (Some(TextObject::plain(" ")), Vec::new());
        }
        (self.text, self.fields)
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ActionElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(ActionElement::Button(button));
        self
    }

    pub fn static_select(&mut self, select: StaticSelectElement) -> &mut Self {
        self.elements.push(ActionElement::StaticSelect(select));
        self
    }

    fn build(self) -> Vec<ActionElement> {
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
