//! Script Filter feedback: the items Alfred shows for a query.

use serde::Serialize;
use std::borrow::Cow;
use std::io::Write;

use crate::error::{Error, Result};

const SYSTEM_ICONS: &str = "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/";

/// Icon shown next to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icon {
  pub path: Cow<'static, str>,
  /// `fileicon` or `filetype`; plain image path when absent
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<Cow<'static, str>>,
}

macro_rules! system_icon {
  ($name:ident, $file:literal) => {
    pub const $name: Icon = Icon {
      path: Cow::Borrowed(concat!(
        "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/",
        $file
      )),
      kind: None,
    };
  };
}

impl Icon {
  system_icon!(INFO, "ToolbarInfo.icns");
  system_icon!(WARNING, "AlertCautionIcon.icns");
  system_icon!(ERROR, "AlertStopIcon.icns");
  system_icon!(WORKFLOW, "KEXT.icns");
  system_icon!(BUSY, "BurningIcon.icns");

  /// Image file at `path`.
  pub fn file(path: impl Into<String>) -> Self {
    Self {
      path: Cow::Owned(path.into()),
      kind: None,
    }
  }

  /// The Finder icon of the file at `path`.
  pub fn file_icon(path: impl Into<String>) -> Self {
    Self {
      path: Cow::Owned(path.into()),
      kind: Some(Cow::Borrowed("fileicon")),
    }
  }

  pub fn is_system(&self) -> bool {
    self.path.starts_with(SYSTEM_ICONS)
  }
}

/// One result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
  #[serde(skip_serializing_if = "Option::is_none")]
  uid: Option<String>,
  title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  subtitle: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  arg: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  autocomplete: Option<String>,
  valid: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  icon: Option<Icon>,
}

impl Item {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      ..Default::default()
    }
  }

  pub fn subtitle(&mut self, subtitle: impl Into<String>) -> &mut Self {
    self.subtitle = Some(subtitle.into());
    self
  }

  pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
    self.arg = Some(arg.into());
    self
  }

  pub fn uid(&mut self, uid: impl Into<String>) -> &mut Self {
    self.uid = Some(uid.into());
    self
  }

  /// Text Alfred puts in the query box when the item is tabbed (or actioned
  /// while invalid).
  pub fn autocomplete(&mut self, autocomplete: impl Into<String>) -> &mut Self {
    self.autocomplete = Some(autocomplete.into());
    self
  }

  /// Whether actioning the item runs the workflow's next step.
  pub fn valid(&mut self, valid: bool) -> &mut Self {
    self.valid = valid;
    self
  }

  pub fn icon(&mut self, icon: Icon) -> &mut Self {
    self.icon = Some(icon);
    self
  }

  pub fn title_text(&self) -> &str {
    &self.title
  }

  pub fn subtitle_text(&self) -> Option<&str> {
    self.subtitle.as_deref()
  }

  pub fn arg_text(&self) -> Option<&str> {
    self.arg.as_deref()
  }

  pub fn autocomplete_text(&self) -> Option<&str> {
    self.autocomplete.as_deref()
  }

  pub fn is_valid(&self) -> bool {
    self.valid
  }

  pub fn icon_ref(&self) -> Option<&Icon> {
    self.icon.as_ref()
  }
}

/// Serialized payload.
#[derive(Serialize)]
struct Payload {
  #[serde(skip_serializing_if = "Option::is_none")]
  rerun: Option<f64>,
  items: Vec<Item>,
}

/// Accumulated feedback for one invocation.
#[derive(Debug, Default)]
pub struct Feedback {
  items: Vec<Item>,
  rerun: Option<f64>,
  suppress_uids: bool,
  sent: bool,
}

impl Feedback {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a new item and return it for further configuration.
  pub fn new_item(&mut self, title: impl Into<String>) -> &mut Item {
    self.items.push(Item::new(title));
    let last = self.items.len() - 1;
    &mut self.items[last]
  }

  pub fn items(&self) -> &[Item] {
    &self.items
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Ask Alfred to run the Script Filter again after `seconds`.
  pub fn rerun(&mut self, seconds: f64) {
    self.rerun = Some(seconds);
  }

  pub fn rerun_after(&self) -> Option<f64> {
    self.rerun
  }

  /// Drop item UIDs from the payload so Alfred doesn't reorder by usage.
  pub fn suppress_uids(&mut self, suppress: bool) {
    self.suppress_uids = suppress;
  }

  pub fn is_sent(&self) -> bool {
    self.sent
  }

  /// Serialize the payload as Alfred expects it.
  pub fn to_json(&self) -> Result<String> {
    let items = self
      .items
      .iter()
      .cloned()
      .map(|mut item| {
        if self.suppress_uids {
          item.uid = None;
        }
        item
      })
      .collect();

    serde_json::to_string(&Payload {
      rerun: self.rerun,
      items,
    })
    .map_err(Error::Feedback)
  }

  /// Write the payload to `out` and mark the feedback as sent.
  pub fn send(&mut self, out: &mut dyn Write) -> Result<()> {
    let json = self.to_json()?;
    writeln!(out, "{}", json).map_err(Error::Output)?;
    out.flush().map_err(Error::Output)?;
    self.sent = true;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  #[test]
  fn test_item_serialization_omits_unset_fields() {
    let mut feedback = Feedback::new();
    feedback.new_item("Hello");

    let value: Value = serde_json::from_str(&feedback.to_json().unwrap()).unwrap();
    assert_eq!(value, json!({"items": [{"title": "Hello", "valid": false}]}));
  }

  #[test]
  fn test_item_builder_fields() {
    let mut feedback = Feedback::new();
    feedback
      .new_item("You're not logged in.")
      .subtitle("Press ⏎ to authenticate")
      .arg("auth")
      .valid(true)
      .icon(Icon::INFO);
    feedback.rerun(2.0);

    let value: Value = serde_json::from_str(&feedback.to_json().unwrap()).unwrap();
    assert_eq!(value["rerun"], json!(2.0));
    let item = &value["items"][0];
    assert_eq!(item["arg"], "auth");
    assert_eq!(item["valid"], true);
    assert_eq!(
      item["icon"]["path"],
      "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/ToolbarInfo.icns"
    );
    assert!(item["icon"].get("type").is_none());
  }

  #[test]
  fn test_suppress_uids() {
    let mut feedback = Feedback::new();
    feedback.new_item("a").uid("a-uid");

    let value: Value = serde_json::from_str(&feedback.to_json().unwrap()).unwrap();
    assert_eq!(value["items"][0]["uid"], "a-uid");

    feedback.suppress_uids(true);
    let value: Value = serde_json::from_str(&feedback.to_json().unwrap()).unwrap();
    assert!(value["items"][0].get("uid").is_none());
    assert_eq!(feedback.items()[0], {
      let mut item = Item::new("a");
      item.uid("a-uid");
      item
    });
  }

  #[test]
  fn test_send_writes_one_line() {
    let mut feedback = Feedback::new();
    feedback.new_item("x");
    let mut out = Vec::new();
    feedback.send(&mut out).unwrap();

    assert!(feedback.is_sent());
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 1);
  }

  #[test]
  fn test_icons() {
    assert!(Icon::WORKFLOW.is_system());
    let icon = Icon::file_icon("/Applications/Safari.app");
    assert!(!icon.is_system());
    assert_eq!(
      serde_json::to_value(&icon).unwrap(),
      json!({"path": "/Applications/Safari.app", "type": "fileicon"})
    );
  }
}
