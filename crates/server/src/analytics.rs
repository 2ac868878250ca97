use std::sync::Arc;

use async_trait::async_trait;
use attendly_agent::AgentRuntime;
use attendly_core::clock::{Clock, OrgTimeZone};
use attendly_core::domain::query::{LeaveStats, QueryIntent};
use attendly_core::errors::ApplicationError;
use attendly_db::{LeaveRepository, RepositoryError};
use attendly_slack::blocks::{
    employee_report, interface_error_notice, no_data_report, period_report, top_employee_report,
    MessageTemplate,
};
use attendly_slack::commands::{
    AnalyticsCommandService, CommandReply, CommandRouteError, QueryCommand,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// A query that ran but matched nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum NoDataCondition {
    NoLeaves,
    NoLeavesForUser { username: String },
}

impl NoDataCondition {
    pub fn message(&self) -> String {
        match self {
            Self::NoLeaves => "No leave records found for any employee. Please ensure that leave data is available for this period.".to_string(),
            Self::NoLeavesForUser { username } => format!(
                "No leave records found for *{username}*. Please check if the username is correct or if they have taken any leave."
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("no data: {0:?}")]
    NoData(NoDataCondition),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum AggregationReport {
    TopEmployee { stats: LeaveStats },
    PeriodStats { start_date: NaiveDate, end_date: NaiveDate, rows: Vec<LeaveStats> },
    EmployeeStats { username: String, rows: Vec<LeaveStats> },
}

impl AggregationReport {
    pub fn to_message(&self) -> MessageTemplate {
        match self {
            Self::TopEmployee { stats } => top_employee_report(stats),
            Self::PeriodStats { start_date, end_date, rows } => {
                period_report(*start_date, *end_date, rows)
            }
            Self::EmployeeStats { username, rows } => employee_report(username, rows),
        }
    }
}

/// Runs one of the three fixed aggregations against the leave store.
#[derive(Clone)]
pub struct AggregationDispatcher {
    repository: Arc<dyn LeaveRepository>,
    zone: OrgTimeZone,
}

impl AggregationDispatcher {
    pub fn new(repository: Arc<dyn LeaveRepository>, zone: OrgTimeZone) -> Self {
        Self { repository, zone }
    }

    pub async fn dispatch(&self, intent: &QueryIntent) -> Result<AggregationReport, AggregationError> {
        match intent {
            QueryIntent::TopEmployee => match self.repository.top_employee().await? {
                Some(stats) => Ok(AggregationReport::TopEmployee { stats }),
                None => Err(AggregationError::NoData(NoDataCondition::NoLeaves)),
            },
            QueryIntent::PeriodStats { start_date, end_date } => {
                let (from, until) = self.zone.inclusive_range(*start_date, *end_date);
                let rows = self.repository.stats_by_period(from, until).await?;
                Ok(AggregationReport::PeriodStats {
                    start_date: *start_date,
                    end_date: *end_date,
                    rows,
                })
            }
            QueryIntent::EmployeeStats { username } => {
                let rows = self.repository.stats_for_user(username).await?;
                if rows.is_empty() {
                    return Err(AggregationError::NoData(NoDataCondition::NoLeavesForUser {
                        username: username.clone(),
                    }));
                }
                Ok(AggregationReport::EmployeeStats { username: username.clone(), rows })
            }
        }
    }
}

/// How an analytics question ended, short of an internal failure.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    Report(AggregationReport),
    NoData(NoDataCondition),
    /// The question could not be turned into a query; carries text for the asker.
    Unanswerable(String),
}

/// Classifier plus dispatcher: a free-text question in, a report out.
#[derive(Clone)]
pub struct AnalyticsService {
    agent: Arc<AgentRuntime>,
    dispatcher: AggregationDispatcher,
    clock: Arc<dyn Clock>,
    zone: OrgTimeZone,
}

impl AnalyticsService {
    pub fn new(
        agent: Arc<AgentRuntime>,
        repository: Arc<dyn LeaveRepository>,
        clock: Arc<dyn Clock>,
        zone: OrgTimeZone,
    ) -> Self {
        Self { agent, dispatcher: AggregationDispatcher::new(repository, zone.clone()), clock, zone }
    }

    pub async fn ask(&self, question: &str) -> Result<QueryOutcome, ApplicationError> {
        let now = self.zone.now(self.clock.as_ref());
        let intent = match self.agent.classifier().classify(question, now).await {
            Ok(intent) => intent,
            Err(classifier_error) => {
                return match classifier_error.user_message() {
                    Some(message) => Ok(QueryOutcome::Unanswerable(message)),
                    None => Err(ApplicationError::Interpretation(classifier_error.to_string())),
                };
            }
        };

        info!(
            event_name = "analytics.query.classified",
            query_type = %intent.query_type(),
            "analytics question classified"
        );
        self.run(&intent).await
    }

    /// Period stats for the calendar month before today.
    pub async fn previous_month(&self) -> Result<QueryOutcome, ApplicationError> {
        let today = self.zone.today(self.clock.as_ref());
        let (start_date, end_date) = self.zone.previous_month(today);
        self.run(&QueryIntent::PeriodStats { start_date, end_date }).await
    }

    async fn run(&self, intent: &QueryIntent) -> Result<QueryOutcome, ApplicationError> {
        match self.dispatcher.dispatch(intent).await {
            Ok(report) => Ok(QueryOutcome::Report(report)),
            Err(AggregationError::NoData(condition)) => Ok(QueryOutcome::NoData(condition)),
            Err(AggregationError::Persistence(repository_error)) => {
                Err(ApplicationError::Persistence(repository_error.to_string()))
            }
        }
    }
}

#[async_trait]
impl AnalyticsCommandService for AnalyticsService {
    async fn answer(&self, command: &QueryCommand) -> Result<CommandReply, CommandRouteError> {
        Ok(match self.ask(&command.question).await {
            Ok(QueryOutcome::Report(report)) => CommandReply::Report(report.to_message()),
            Ok(QueryOutcome::NoData(condition)) => {
                CommandReply::Report(no_data_report(&condition.message()))
            }
            Ok(QueryOutcome::Unanswerable(message)) => {
                CommandReply::Private(MessageTemplate::text(format!("❌ {message}")))
            }
            Err(application_error) => {
                error!(
                    event_name = "analytics.query.failed",
                    correlation_id = %command.request_id,
                    user_id = %command.user_id,
                    channel_id = %command.channel_id,
                    question = %command.question,
                    error_kind = application_error.kind(),
                    error = %application_error,
                    "analytics query failed"
                );
                let notice = application_error.into_interface(command.request_id.clone());
                CommandReply::Private(interface_error_notice(&notice))
            }
        })
    }
}
