//! Fan-out/fan-in over independent children
//!
//! A [`Group`] dispatches all of its children at once. Children are messages,
//! pipelines or other groups, and unlike pipelines, groups keep their shape:
//! a group of three groups of two reports a 3×2 nested result, not a flat
//! list of six.
//!
//! Inspection is derived on demand from point lookups in the result backend:
//!
//! | child    | complete when                          | result               |
//! |----------|----------------------------------------|----------------------|
//! | Message  | its result is stored                   | its result           |
//! | Pipeline | its last stage's result is stored      | last stage's result  |
//! | Group    | all of its own children are complete   | its nested results   |
//!
//! When a completion callback is attached, [`Group::run`] also sets up the
//! outstanding-counter protocol described in [`crate::completion`].

use crate::async_utils::{poll_until, Deadline};
use crate::completion::{CompletionCoordinator, GroupLink};
use crate::error::{CompositionError, Result};
use crate::pipeline::Pipeline;
use crate::results::Results;
use futures::future::{BoxFuture, FutureExt};
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tandem_store::message::options;
use tandem_store::{Broker, Message};
use uuid::Uuid;

/// One member of a group
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Message(Message),
    Pipeline(Pipeline),
    Group(Group),
}

impl Child {
    /// Id the completion coordinator de-duplicates this child's report on
    fn completion_id(&self) -> &str {
        match self {
            Child::Message(message) => message.message_id(),
            Child::Pipeline(pipeline) => pipeline.message_id(),
            Child::Group(group) => group.group_id(),
        }
    }
}

impl From<Message> for Child {
    fn from(message: Message) -> Self {
        Child::Message(message)
    }
}

impl From<Pipeline> for Child {
    fn from(pipeline: Pipeline) -> Self {
        Child::Pipeline(pipeline)
    }
}

impl From<Group> for Child {
    fn from(group: Group) -> Self {
        Child::Group(group)
    }
}

/// Result of one group child, mirroring the group's nesting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GroupResult {
    Value(Value),
    Group(Vec<GroupResult>),
}

impl GroupResult {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            GroupResult::Value(value) => Some(value),
            GroupResult::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&[GroupResult]> {
        match self {
            GroupResult::Value(_) => None,
            GroupResult::Group(children) => Some(children),
        }
    }

    /// Plain JSON view; nested groups become arrays
    pub fn to_value(&self) -> Value {
        match self {
            GroupResult::Value(value) => value.clone(),
            GroupResult::Group(children) => {
                Value::Array(children.iter().map(GroupResult::to_value).collect())
            }
        }
    }
}

/// Collection of children dispatched together
///
/// Within a tracked group (one with a completion callback, or nested in one)
/// every direct child must report under its own id; [`Group::run`] rejects a
/// group holding the same message, pipeline or group twice.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    group_id: String,
    children: Vec<Child>,
    completion: Option<Message>,
}

/// Build a group, optionally with a completion callback
pub fn compose_group<I, C>(elements: I, completion: Option<Message>) -> Group
where
    I: IntoIterator<Item = C>,
    C: Into<Child>,
{
    let mut group = Group::new(elements);
    group.completion = completion;
    group
}

impl Group {
    /// Group over `children`, in declaration order, with a fresh group id
    pub fn new<I, C>(children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Child>,
    {
        Self {
            group_id: Uuid::new_v4().to_string(),
            children: children.into_iter().map(Into::into).collect(),
            completion: None,
        }
    }

    /// Attach the message to enqueue once every child has completed
    ///
    /// A group holds at most one callback; a second one is a
    /// [`CompositionError::Configuration`] error.
    pub fn add_completion_callback(&mut self, message: Message) -> Result<()> {
        if let Some(existing) = &self.completion {
            return Err(CompositionError::Configuration(format!(
                "group {} already has completion callback {}",
                self.group_id, existing
            )));
        }
        self.completion = Some(message);
        Ok(())
    }

    /// Builder form of [`add_completion_callback`](Self::add_completion_callback)
    pub fn with_completion_callback(mut self, message: Message) -> Result<Self> {
        self.add_completion_callback(message)?;
        Ok(self)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn completion(&self) -> Option<&Message> {
        self.completion.as_ref()
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this group or any nested group has a completion callback
    fn requires_coordinator(&self) -> bool {
        self.completion.is_some()
            || self.children.iter().any(|child| match child {
                Child::Group(group) => group.requires_coordinator(),
                _ => false,
            })
    }

    /// Tracked groups need one completion id per direct child
    fn check_completion_ids(&self, tracked: bool) -> Result<()> {
        let tracked = tracked || self.completion.is_some();
        let mut seen = HashSet::new();
        for child in &self.children {
            if tracked && !seen.insert(child.completion_id()) {
                return Err(CompositionError::Configuration(format!(
                    "group {} holds child {} more than once",
                    self.group_id,
                    child.completion_id()
                )));
            }
            if let Child::Group(group) = child {
                group.check_completion_ids(tracked)?;
            }
        }
        Ok(())
    }

    /// Dispatch every child
    ///
    /// Fails with [`CompositionError::Configuration`] before anything is
    /// enqueued when a callback is attached anywhere in the group but no
    /// coordinator is given, or when a tracked group repeats a child.
    pub async fn run(
        &self,
        broker: &dyn Broker,
        coordinator: Option<&CompletionCoordinator>,
    ) -> Result<()> {
        if coordinator.is_none() && self.requires_coordinator() {
            return Err(CompositionError::Configuration(format!(
                "group {} has a completion callback but no completion coordinator is configured",
                self.group_id
            )));
        }
        if coordinator.is_some() {
            self.check_completion_ids(false)?;
        }
        self.dispatch(broker, coordinator, None).await
    }

    fn dispatch<'a>(
        &'a self,
        broker: &'a dyn Broker,
        coordinator: Option<&'a CompletionCoordinator>,
        parent: Option<GroupLink>,
    ) -> BoxFuture<'a, Result<()>> {
        self.dispatch_children(broker, coordinator, parent).boxed()
    }

    async fn dispatch_children(
        &self,
        broker: &dyn Broker,
        coordinator: Option<&CompletionCoordinator>,
        parent: Option<GroupLink>,
    ) -> Result<()> {
        // a counter is needed when someone waits on this group's completion
        let tracked = match coordinator {
            Some(coordinator) if self.completion.is_some() || parent.is_some() => {
                let link = GroupLink::new(&self.group_id, self.completion.clone(), parent);
                if self.children.is_empty() {
                    return coordinator.complete_empty(broker, &link).await;
                }
                coordinator
                    .initialize(&self.group_id, self.children.len())
                    .await?;
                Some(link)
            }
            _ => None,
        };

        tracing::info!(
            group_id = %self.group_id,
            children = self.children.len(),
            tracked = tracked.is_some(),
            "Dispatching group"
        );

        for (index, child) in self.children.iter().enumerate() {
            let terminal_options = match &tracked {
                Some(link) => {
                    let mut extra = link.to_options()?;
                    if index == 0 {
                        extra.insert(options::GROUP_SIZE.to_string(), json!(self.children.len()));
                    }
                    Some(extra)
                }
                None => None,
            };

            match (child, terminal_options) {
                (Child::Message(message), Some(extra)) => {
                    broker.enqueue(message.clone().with_options(extra)).await?
                }
                (Child::Message(message), None) => broker.enqueue(message.clone()).await?,
                (Child::Pipeline(pipeline), Some(extra)) => {
                    pipeline.with_terminal_options(extra)?.run(broker).await?
                }
                (Child::Pipeline(pipeline), None) => pipeline.run(broker).await?,
                (Child::Group(group), _) => {
                    group.dispatch(broker, coordinator, tracked.clone()).await?
                }
            }
        }
        Ok(())
    }

    /// Number of direct children currently complete
    pub async fn completed_count(&self, results: &Results) -> Result<usize> {
        let mut count = 0;
        for child in &self.children {
            if child_completed(child, results).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether every direct child is complete
    pub fn completed<'a>(&'a self, results: &'a Results) -> BoxFuture<'a, Result<bool>> {
        self.completed_count(results)
            .map(move |count| count.map(|count| count == self.len()))
            .boxed()
    }

    /// One result per direct child, in declaration order, as a lazy stream
    ///
    /// Nested groups yield their own results as a [`GroupResult::Group`].
    /// `timeout` is one budget for the whole call, shared by every child.
    pub fn get_results<'a>(
        &'a self,
        results: &'a Results,
        block: bool,
        timeout: Option<Duration>,
    ) -> impl Stream<Item = Result<GroupResult>> + Send + 'a {
        let deadline = Deadline::new(timeout.unwrap_or_else(|| results.default_timeout()));
        async_stream::try_stream! {
            for child in &self.children {
                yield child_result(child, results, block, deadline.remaining()).await?;
            }
        }
    }

    /// Block until the group is complete or `timeout` elapses
    pub async fn wait(&self, results: &Results, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| results.default_timeout());
        let deadline = Deadline::new(timeout);

        let done = poll_until(results.poll_policy(), &deadline, || async move {
            self.completed(results)
                .await
                .map(|complete| complete.then_some(()))
        })
        .await?;

        done.ok_or_else(|| CompositionError::ResultTimeout {
            target: format!("group {}", self.group_id),
            timeout,
        })
    }
}

async fn child_completed(child: &Child, results: &Results) -> Result<bool> {
    match child {
        Child::Message(message) => results.has_result(message.message_id()).await,
        Child::Pipeline(pipeline) => pipeline.completed(results).await,
        Child::Group(group) => group.completed(results).await,
    }
}

fn child_result<'a>(
    child: &'a Child,
    results: &'a Results,
    block: bool,
    timeout: Duration,
) -> BoxFuture<'a, Result<GroupResult>> {
    resolve_child(child, results, block, timeout).boxed()
}

async fn resolve_child(
    child: &Child,
    results: &Results,
    block: bool,
    timeout: Duration,
) -> Result<GroupResult> {
    let result = match child {
        Child::Message(message) => GroupResult::Value(
            results
                .get_result(message.message_id(), block, Some(timeout))
                .await?,
        ),
        Child::Pipeline(pipeline) => {
            GroupResult::Value(pipeline.get_result(results, block, Some(timeout)).await?)
        }
        Child::Group(group) => GroupResult::Group(
            group
                .get_results(results, block, Some(timeout))
                .try_collect()
                .await?,
        ),
    };
    Ok(result)
}
