use attendly_core::domain::query::LeaveStats;
use attendly_core::errors::InterfaceError;
use attendly_core::validation::AcceptedLeave;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

const LEAVE_TIME_FORMAT: &str = "%b %-d, %Y %-I:%M %p";
const REPORT_DATE_FORMAT: &str = "%b %-d, %Y";
pub const REPORT_TITLE: &str = "📊 Leave Statistics Report";

/// Rows rendered per report. Slack rejects messages over 50 blocks.
pub const MAX_REPORT_ROWS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    #[serde(rename = "mrkdwn")]
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
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

/// A rendered message: `fallback_text` goes into the `text` field Slack shows
/// in notifications, `blocks` is the rich body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
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

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
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

fn leave_time(value: &DateTime<FixedOffset>) -> String {
    value.format(LEAVE_TIME_FORMAT).to_string()
}

pub fn leave_confirmation_message(leave: &AcceptedLeave) -> MessageTemplate {
    let reason = if leave.reason.trim().is_empty() { "Not specified" } else { leave.reason.trim() };
    let text = format!(
        "{emoji} Your {label} has been recorded!\n📅 From: {from}\n📅 To: {to}\n📝 Reason: {reason}\n\nStatus: {status}\nHave a great day! 🌟",
        emoji = leave.leave_type.emoji(),
        label = leave.leave_type.label(),
        from = leave_time(&leave.start_time),
        to = leave_time(&leave.end_time),
        status = leave.leave_type.status_line(),
    );

    MessageBuilder::new(text.clone())
        .section("leave.confirmation.v1", |section| {
            section.mrkdwn(text);
        })
        .context("leave.confirmation.duration.v1", |context| {
            context.plain(format!("Duration: {}", leave.duration_label));
        })
        .build()
}

pub fn leave_rejection_text(reason: &str) -> String {
    format!("❌ Unable to process leave request: {reason}")
}

pub fn failure_notice(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(format!("❌ {summary}"))
        .section("attendly.error.summary.v1", |section| {
            section.mrkdwn(format!("❌ {summary}"));
        })
        .context("attendly.error.context.v1", |context| {
            context.plain(format!("Reference: {correlation_id}"));
        })
        .build()
}

/// User-safe rendering of an internal failure: never the underlying detail.
pub fn interface_error_notice(error: &InterfaceError) -> MessageTemplate {
    failure_notice(error.user_message(), error.correlation_id())
}

fn stats_lines(stats: &LeaveStats) -> String {
    format!(
        "• Leave Count: {}\n• Types: {}\n• Total Hours: {:.1}",
        stats.leave_count, stats.leave_types, stats.total_hours
    )
}

fn report(fallback_text: String) -> MessageBuilder {
    MessageBuilder::new(fallback_text).header("leave.report.header.v1", REPORT_TITLE)
}

pub fn top_employee_report(stats: &LeaveStats) -> MessageTemplate {
    report(format!("Employee with most leaves: {}", stats.username))
        .section("leave.report.top.v1", |section| {
            section.mrkdwn(format!(
                "👑 *Employee with Most Leaves*\n\n*{}*\n{}",
                stats.username,
                stats_lines(stats)
            ));
        })
        .build()
}

pub fn period_report(start: NaiveDate, end: NaiveDate, rows: &[LeaveStats]) -> MessageTemplate {
    let period = format!(
        "*Period:* {} to {}",
        start.format(REPORT_DATE_FORMAT),
        end.format(REPORT_DATE_FORMAT)
    );
    let mut builder = report(format!("{REPORT_TITLE} ({} employees)", rows.len()))
        .section("leave.report.period.v1", |section| {
            section.mrkdwn(period);
        });

    if rows.is_empty() {
        builder = builder.section("leave.report.period.empty.v1", |section| {
            section.plain("No leave records in this period.");
        });
    }

    for (index, stats) in rows.iter().take(MAX_REPORT_ROWS).enumerate() {
        builder = builder.divider(format!("leave.report.divider.{index}")).section(
            format!("leave.report.row.{index}"),
            |section| {
                section.mrkdwn(format!("*{}*\n{}", stats.username, stats_lines(stats)));
            },
        );
    }

    omitted_rows(builder, rows.len()).build()
}

pub fn employee_report(username: &str, rows: &[LeaveStats]) -> MessageTemplate {
    let mut builder = report(format!("Leave statistics for {username}"));
    for (index, stats) in rows.iter().take(MAX_REPORT_ROWS).enumerate() {
        builder = builder.section(format!("leave.report.employee.{index}"), |section| {
            section.mrkdwn(format!("*{}*\n{}", stats.username, stats_lines(stats)));
        });
    }
    omitted_rows(builder, rows.len()).build()
}

fn omitted_rows(builder: MessageBuilder, total: usize) -> MessageBuilder {
    let omitted = total.saturating_sub(MAX_REPORT_ROWS);
    if omitted == 0 {
        return builder;
    }
    builder.context("leave.report.truncated.v1", |context| {
        context.plain(format!("…and {omitted} more employees with fewer leaves"));
    })
}

/// Used for "no data" outcomes so they read as a normal report, not a failure.
pub fn no_data_report(message: &str) -> MessageTemplate {
    report(message.to_string())
        .section("leave.report.no_data.v1", |section| {
            section.mrkdwn(message);
        })
        .build()
}
