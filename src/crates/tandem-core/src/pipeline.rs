//! Sequential chains of messages
//!
//! A [`Pipeline`] is a flat, ordered list of messages in which every message
//! except the last carries the next one, by value, under the `pipe_target`
//! option. Running a pipeline enqueues only the first message; each following
//! stage is enqueued by the worker that completed the previous one (see
//! [`Pipelines`](crate::hooks::Pipelines)).
//!
//! ```text
//!  add(1, 2) ──pipe_target──► add(3) ──pipe_target──► add(4)
//!      │                        ▲  │                    ▲
//!      └─ result 3 appended ────┘  └─ result 6 appended ┘      => 10
//! ```
//!
//! Nested pipelines are spliced in at construction time, so a pipeline never
//! contains another pipeline. Its identity for result purposes is the id of
//! its last message.

use crate::async_utils::Deadline;
use crate::error::{CompositionError, Result};
use crate::results::Results;
use futures::Stream;
use serde_json::{Map, Value};
use std::time::Duration;
use tandem_store::message::options;
use tandem_store::{Broker, Message};

/// Anything that can be an element of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Composable {
    Message(Message),
    Pipeline(Pipeline),
}

impl From<Message> for Composable {
    fn from(message: Message) -> Self {
        Composable::Message(message)
    }
}

impl From<Pipeline> for Composable {
    fn from(pipeline: Pipeline) -> Self {
        Composable::Pipeline(pipeline)
    }
}

/// Flattened chain of messages
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    messages: Vec<Message>,
}

/// Build a pipeline from messages and pipelines, in order
pub fn compose_pipeline<I, C>(elements: I) -> Result<Pipeline>
where
    I: IntoIterator<Item = C>,
    C: Into<Composable>,
{
    Pipeline::compose(elements)
}

impl Pipeline {
    /// Build a pipeline from messages and pipelines, in order
    ///
    /// Nested pipelines are spliced in place. Fails with
    /// [`CompositionError::Construction`] when `elements` is empty.
    pub fn compose<I, C>(elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Composable>,
    {
        let mut stages = Vec::new();
        for element in elements {
            match element.into() {
                Composable::Message(message) => stages.push(message),
                Composable::Pipeline(pipeline) => stages.extend(pipeline.messages),
            }
        }

        if stages.is_empty() {
            return Err(CompositionError::Construction(
                "a pipeline needs at least one message".to_string(),
            ));
        }

        Self::wire(stages)
    }

    /// Append `element` after the last stage
    pub fn then(self, element: impl Into<Composable>) -> Result<Self> {
        Self::compose([Composable::Pipeline(self), element.into()])
    }

    // Rebuilds every pipe_target from the back so each embedded copy already
    // carries its own successor.
    fn wire(stages: Vec<Message>) -> Result<Self> {
        let mut wired = Vec::with_capacity(stages.len());
        let mut next: Option<Value> = None;

        for stage in stages.into_iter().rev() {
            let stage = match next.take() {
                Some(target) => stage.with_option(options::PIPE_TARGET, target),
                None => stage.without_option(options::PIPE_TARGET),
            };
            next = Some(stage.to_value()?);
            wired.push(stage);
        }

        wired.reverse();
        Ok(Self { messages: wired })
    }

    /// Copy of this pipeline whose last message carries `extra` options
    pub(crate) fn with_terminal_options(&self, extra: Map<String, Value>) -> Result<Self> {
        let mut stages = self.messages.clone();
        if let Some(last) = stages.pop() {
            stages.push(last.with_options(extra));
        }
        Self::wire(stages)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always `false`; construction rejects empty pipelines
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first(&self) -> &Message {
        &self.messages[0]
    }

    pub fn last(&self) -> &Message {
        &self.messages[self.messages.len() - 1]
    }

    /// Id under which the pipeline's final result is stored
    pub fn message_id(&self) -> &str {
        self.last().message_id()
    }

    /// Enqueue the first stage
    pub async fn run(&self, broker: &dyn Broker) -> Result<()> {
        let first = self.first().clone();
        tracing::debug!(
            pipeline = %self.message_id(),
            stages = self.len(),
            first = %first,
            "Running pipeline"
        );
        broker.enqueue(first).await?;
        Ok(())
    }

    /// Number of stages whose result is currently stored
    pub async fn completed_count(&self, results: &Results) -> Result<usize> {
        let mut count = 0;
        for message in &self.messages {
            if results.has_result(message.message_id()).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether the last stage has a stored result
    pub async fn completed(&self, results: &Results) -> Result<bool> {
        results.has_result(self.message_id()).await
    }

    /// Result of the last stage
    pub async fn get_result(
        &self,
        results: &Results,
        block: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        results.get_result(self.message_id(), block, timeout).await
    }

    /// Results of every stage, in order, as a lazy stream
    ///
    /// `timeout` bounds the whole stream: each stage gets whatever is left of
    /// it, and the stream ends with `ResultTimeout` as soon as a stage runs
    /// out. Each call starts a fresh stream that reads current backend state.
    pub fn get_results<'a>(
        &'a self,
        results: &'a Results,
        block: bool,
        timeout: Option<Duration>,
    ) -> impl Stream<Item = Result<Value>> + Send + 'a {
        let deadline = Deadline::new(timeout.unwrap_or_else(|| results.default_timeout()));
        async_stream::try_stream! {
            for message in &self.messages {
                let remaining = deadline.remaining();
                yield results.get_result(message.message_id(), block, Some(remaining)).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn add(args: Vec<Value>) -> Message {
        Message::new("add", args)
    }

    #[test]
    fn test_messages_reference_the_next_message() {
        let pipe = Pipeline::compose([add(vec![json!(1), json!(2)]), add(vec![json!(3)]), add(vec![json!(4)])])
            .unwrap();

        let messages = pipe.messages();
        assert_eq!(
            messages[0].option(options::PIPE_TARGET),
            Some(&messages[1].to_value().unwrap())
        );
        assert_eq!(
            messages[1].option(options::PIPE_TARGET),
            Some(&messages[2].to_value().unwrap())
        );
        assert!(messages[2].option(options::PIPE_TARGET).is_none());
    }

    #[test]
    fn test_nested_pipelines_are_flattened() {
        let inner = Pipeline::compose([add(vec![json!(3)]), add(vec![json!(4)])]).unwrap();
        let pipe = Pipeline::compose([
            Composable::from(add(vec![json!(1), json!(2)])),
            Composable::from(inner),
            Composable::from(add(vec![json!(5)])),
        ])
        .unwrap();

        assert_eq!(pipe.len(), 4);
        let args: Vec<_> = pipe.messages().iter().map(|m| m.args().to_vec()).collect();
        assert_eq!(
            args,
            vec![
                vec![json!(1), json!(2)],
                vec![json!(3)],
                vec![json!(4)],
                vec![json!(5)],
            ]
        );
        // the spliced pipeline's last stage now continues into the outer one
        assert_eq!(
            pipe.messages()[2].pipe_target().unwrap().as_ref(),
            Some(&pipe.messages()[3])
        );
    }

    #[test]
    fn test_empty_pipeline_is_a_construction_error() {
        let err = Pipeline::compose(Vec::<Message>::new()).unwrap_err();
        assert!(matches!(err, CompositionError::Construction(_)));
    }

    #[test]
    fn test_then_appends_a_stage() {
        let pipe = Pipeline::compose([add(vec![json!(1), json!(2)])])
            .unwrap()
            .then(add(vec![json!(3)]))
            .unwrap();

        assert_eq!(pipe.len(), 2);
        assert_eq!(pipe.message_id(), pipe.messages()[1].message_id());
    }

    #[test]
    fn test_terminal_options_are_visible_through_the_chain() {
        let pipe = Pipeline::compose([add(vec![json!(1)]), add(vec![]), add(vec![])]).unwrap();
        let mut extra = Map::new();
        extra.insert("marker".to_string(), json!(true));

        let tagged = pipe.with_terminal_options(extra).unwrap();

        assert_eq!(tagged.last().option("marker"), Some(&json!(true)));
        let second = tagged.first().pipe_target().unwrap().unwrap();
        let third = second.pipe_target().unwrap().unwrap();
        assert_eq!(third.option("marker"), Some(&json!(true)));
        assert_eq!(tagged.message_id(), pipe.message_id());
    }

    fn element_lengths() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0usize..4, 1..8)
    }

    proptest! {
        // 0 stands for a bare message, n > 0 for a pipeline of n messages
        #[test]
        fn prop_flattened_length_is_sum_of_parts(lengths in element_lengths()) {
            let elements: Vec<Composable> = lengths
                .iter()
                .map(|&n| {
                    if n == 0 {
                        Composable::from(add(vec![]))
                    } else {
                        let stages: Vec<Message> = (0..n).map(|_| add(vec![])).collect();
                        Composable::from(Pipeline::compose(stages).unwrap())
                    }
                })
                .collect();
            let expected: usize = lengths.iter().map(|&n| n.max(1)).sum();

            let pipe = Pipeline::compose(elements).unwrap();

            prop_assert_eq!(pipe.len(), expected);
            for pair in pipe.messages().windows(2) {
                let next = pair[0].pipe_target().unwrap();
                prop_assert_eq!(next.as_ref(), Some(&pair[1]));
            }
            prop_assert!(pipe.last().pipe_target().unwrap().is_none());
        }
    }
}
