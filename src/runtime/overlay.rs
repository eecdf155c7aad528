//! Frame and global scopes: singleton producers living outside the stack.

use serde_json::Value;

use crate::layout::{Stack, frame_enabled};
use crate::logging::{LogLevel, json_kv};
use crate::navigation::{Command, NavSource};
use crate::stream::{Stream, Subscription};
use crate::telemetry::{LIFECYCLE_TARGET, Telemetry};
use crate::view::ViewRef;

use super::driver::{Envelope, Scope};
use super::screens::{ProducerContext, ScreenFn, ScreenSinks, ScreenSources};
use super::sinks::ChannelSet;

/// One mounted overlay scope.
///
/// The scope's event source is not part of the id registry; its lifecycle is
/// driven explicitly (see [`FrameLifecycle`]). Driver channels it writes to
/// are tagged with its [`Scope`].
pub struct OverlayScope {
    scope: Scope,
    source: NavSource,
    view: Option<Stream<ViewRef>>,
    commands: Stream<Command>,
    channels: ChannelSet<Envelope>,
    _sinks: ScreenSinks,
    _sources: ScreenSources,
}

impl OverlayScope {
    /// Build the scope by running `screen` once. `children` is handed to the
    /// frame so it can embed the stack's composed view.
    pub fn mount(
        scope: Scope,
        screen: &ScreenFn,
        context: &ProducerContext,
        children: Option<Stream<ViewRef>>,
    ) -> Self {
        let source = NavSource::new(&context.bus);
        let mut sources = context.sources(&scope, source.clone(), Value::Null);
        if let Some(children) = children {
            sources = sources.with_children(children);
        }
        let sinks = screen(sources.clone());

        let commands = match sinks.navigation.as_ref() {
            Some(navigation) => Stream::merge([navigation.clone(), source.commands()]),
            None => source.commands(),
        };

        let channels = context
            .channel_names()
            .filter_map(|name| {
                let output = sinks.channel(name)?;
                let tag = scope.clone();
                let tagged = output.map(move |payload: &Value| Envelope::scoped(tag.clone(), payload.clone()));
                Some((name.to_string(), tagged))
            })
            .collect();

        Self {
            view: sinks.screen.clone(),
            scope,
            source,
            commands,
            channels,
            _sinks: sinks,
            _sources: sources,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn source(&self) -> &NavSource {
        &self.source
    }

    pub fn view(&self) -> Option<Stream<ViewRef>> {
        self.view.clone()
    }

    pub fn commands(&self) -> Stream<Command> {
        self.commands.clone()
    }

    pub fn channels(&self) -> &ChannelSet<Envelope> {
        &self.channels
    }
}

/// Frame visibility derived from the top stack entry, repeats dropped.
pub fn frame_visibility(stack: &Stream<Stack>) -> Stream<bool> {
    stack.map(|stack: &Stack| frame_enabled(stack)).drop_repeats()
}

/// Fires the frame's direct appear/disappear triggers whenever its
/// visibility flips.
pub struct FrameLifecycle {
    _subscription: Subscription,
}

impl FrameLifecycle {
    pub fn attach(enabled: &Stream<bool>, source: NavSource, telemetry: Telemetry) -> Self {
        let subscription = enabled.subscribe(move |enabled: &bool| {
            telemetry.log(
                LogLevel::Debug,
                LIFECYCLE_TARGET,
                "frame_visibility",
                [json_kv("enabled", *enabled)],
            );
            if *enabled {
                source.trigger_appear();
            } else {
                source.trigger_disappear();
            }
        });
        Self {
            _subscription: subscription,
        }
    }
}
