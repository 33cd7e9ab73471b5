#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub id: String,
    pub name: String,
    pub name_en: String,
    pub login_url: String,
    pub upload_url: String,
    pub post_list_url: String,
}

/// An element addressed by CSS selector, optionally narrowed to matches whose
/// inner text contains `text`, then to the `nth` remaining match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub selector: &'static str,
    pub text: Option<&'static str>,
    pub exact: bool,
    pub nth: usize,
}

impl Target {
    pub const fn css(selector: &'static str) -> Self {
        Self {
            selector,
            text: None,
            exact: false,
            nth: 0,
        }
    }

    pub const fn with_text(selector: &'static str, text: &'static str) -> Self {
        Self {
            selector,
            text: Some(text),
            exact: false,
            nth: 0,
        }
    }

    pub const fn exact_text(selector: &'static str, text: &'static str) -> Self {
        Self {
            selector,
            text: Some(text),
            exact: true,
            nth: 0,
        }
    }

    pub const fn nth(self, nth: usize) -> Self {
        Self { nth, ..self }
    }

    pub fn matches_text(&self, candidate: &str) -> bool {
        match self.text {
            None => true,
            Some(text) if self.exact => candidate.trim() == text,
            Some(text) => candidate.contains(text),
        }
    }
}

/// Where the "not logged in" signal lives for a platform.
#[derive(Debug, Clone, Copy)]
pub struct LoginProbe {
    /// Authenticated page to open with the stored token.
    pub url: &'static str,
    /// Element that only renders for logged-out visitors.
    pub logged_out_marker: Target,
    /// Redirect location that also means "logged out".
    pub login_redirect: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadSelectors {
    pub file_input: &'static str,
    pub publish_button: Target,
    /// Class carried by the publish button while media is still processing.
    pub publish_disabled_class: &'static str,
    pub error_signal: &'static str,
    /// Control that removes the failed media so it can be attached again.
    pub delete_media: Option<Target>,
    pub delete_confirm: Option<Target>,
}

#[derive(Debug, Clone, Copy)]
pub struct MetadataSelectors {
    /// Rich editor for description and hashtags.
    pub body_editor: &'static str,
    pub short_title_input: Option<&'static str>,
    /// Clicked in order to declare original content.
    pub original_declaration: &'static [Target],
    /// Clicked in order to hide the location.
    pub location_opt_out: &'static [Target],
}

/// Calendar picker driven one click at a time.
#[derive(Debug, Clone, Copy)]
pub struct PickerSelectors {
    pub toggle: Target,
    pub date_input: &'static str,
    /// Panel header; its leading number is the displayed month.
    pub month_label: Target,
    pub next_month: &'static str,
    /// Selectable day cells; disabled cells are excluded by the selector.
    pub day_cells: &'static str,
    pub time_input: &'static str,
    pub hour_items: &'static str,
    pub minute_items: &'static str,
    /// Clicked to commit the selection.
    pub dismiss: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub enum ScheduleControl {
    Picker(PickerSelectors),
    /// One text input that accepts a formatted timestamp followed by Enter.
    TypedInput {
        toggle: Target,
        input: &'static str,
        format: &'static str,
    },
    /// The upload form cannot schedule; only immediate publishing.
    Unsupported,
}

/// When no publish time is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPublish {
    Immediately,
    NextDayAt(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct CoverSelectors {
    /// Opens the cover editor once the media is ready.
    pub open_editor: Target,
    pub editor: &'static str,
    pub file_input: &'static str,
    pub crop_window: &'static str,
    pub confirm: Target,
}

#[derive(Debug, Clone, Copy)]
pub struct PlatformSelectors {
    pub login: LoginProbe,
    pub upload: UploadSelectors,
    pub metadata: MetadataSelectors,
    pub schedule: ScheduleControl,
    /// Furthest day ahead the schedule control can represent.
    pub schedule_window_days: i64,
    pub default_publish: DefaultPublish,
    pub cover: Option<CoverSelectors>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_filters() {
        let loose = Target::with_text("button", "发表");
        assert!(loose.matches_text(" 发表 "));
        assert!(loose.matches_text("立即发表"));

        let exact = Target::exact_text("button", "删除");
        assert!(exact.matches_text(" 删除\n"));
        assert!(!exact.matches_text("删除视频"));

        assert!(Target::css("div").matches_text("anything"));
        assert_eq!(Target::css("label").nth(1).nth, 1);
    }
}
