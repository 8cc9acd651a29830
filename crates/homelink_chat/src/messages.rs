#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Outbound message payloads, serialized in the platform's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
	Text {
		text: String,
	},

	Image {
		#[serde(rename = "originalContentUrl")]
		original_content_url: String,
		#[serde(rename = "previewImageUrl")]
		preview_image_url: String,
	},

	Location {
		title: String,
		address: String,
		latitude: f64,
		longitude: f64,
	},

	Template {
		#[serde(rename = "altText")]
		alt_text: String,
		template: Template,
	},
}

/// Template payloads (only buttons are used here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Template {
	Buttons {
		title: String,
		text: String,
		actions: Vec<TemplateAction>,
	},
}

/// Tappable actions inside a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateAction {
	/// Posts back an opaque `key=value&key=value` action string.
	Postback {
		label: String,
		data: String,
	},
}

impl Message {
	pub fn text(text: impl Into<String>) -> Self {
		Message::Text { text: text.into() }
	}

	pub fn image(original_content_url: impl Into<String>, preview_image_url: impl Into<String>) -> Self {
		Message::Image {
			original_content_url: original_content_url.into(),
			preview_image_url: preview_image_url.into(),
		}
	}

	pub fn location(title: impl Into<String>, address: impl Into<String>, latitude: f64, longitude: f64) -> Self {
		Message::Location {
			title: title.into(),
			address: address.into(),
			latitude,
			longitude,
		}
	}

	pub fn buttons(
		alt_text: impl Into<String>,
		title: impl Into<String>,
		text: impl Into<String>,
		actions: Vec<TemplateAction>,
	) -> Self {
		Message::Template {
			alt_text: alt_text.into(),
			template: Template::Buttons {
				title: title.into(),
				text: text.into(),
				actions,
			},
		}
	}
}

impl TemplateAction {
	pub fn postback(label: impl Into<String>, data: impl Into<String>) -> Self {
		TemplateAction::Postback {
			label: label.into(),
			data: data.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn text_message_wire_shape() {
		let json = serde_json::to_value(Message::text("hello")).expect("serialize");
		assert_eq!(json, serde_json::json!({"type": "text", "text": "hello"}));
	}

	#[test]
	fn image_message_uses_platform_field_names() {
		let json = serde_json::to_value(Message::image("https://x/full", "https://x/preview")).expect("serialize");
		assert_eq!(json["type"], "image");
		assert_eq!(json["originalContentUrl"], "https://x/full");
		assert_eq!(json["previewImageUrl"], "https://x/preview");
	}

	#[test]
	fn buttons_template_wire_shape() {
		let msg = Message::buttons(
			"menu",
			"Commands",
			"Pick one.",
			vec![TemplateAction::postback("Picture", "action=getpic")],
		);

		let json = serde_json::to_value(msg).expect("serialize");
		assert_eq!(json["type"], "template");
		assert_eq!(json["altText"], "menu");
		assert_eq!(json["template"]["type"], "buttons");
		assert_eq!(json["template"]["actions"][0]["type"], "postback");
		assert_eq!(json["template"]["actions"][0]["data"], "action=getpic");
	}

	#[test]
	fn location_message_carries_literal_coordinates() {
		let json = serde_json::to_value(Message::location("Here", "somewhere", 35.0, 139.0)).expect("serialize");
		assert_eq!(json["latitude"], 35.0);
		assert_eq!(json["longitude"], 139.0);
	}
}
