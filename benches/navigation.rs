use std::io;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use room_nav::logging::{LogEvent, LogSink};
use room_nav::{
    Command, Drivers, Layout, LayoutComponent, Logger, LoggingResult, Navigator, Options,
    RuntimeConfig, ScreenRegistry, ScreenSinks, ScreenSources, Size, Stream, TerminalRenderer,
    View, run,
};
use serde_json::Value;

#[derive(Clone, Default)]
struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _event: &LogEvent) -> LoggingResult<()> {
        Ok(())
    }
}

fn screens() -> ScreenRegistry {
    let mut screens = ScreenRegistry::new();
    for name in ["Feed", "Item", "Login"] {
        screens.register(name, move |sources: ScreenSources| {
            let view = sources.props.map(move |_: &Value| View::text(name));
            ScreenSinks::new().with_screen(view)
        });
    }
    screens.register_frame(|sources: ScreenSources| {
        let view = match sources.children.clone() {
            Some(children) => children.map(|child| View::container(vec![View::text("menu"), child.clone()])),
            None => Stream::of(View::empty()),
        };
        ScreenSinks::new().with_screen(view)
    });
    screens
}

fn build_navigator(logged: bool) -> Navigator {
    let mut config = RuntimeConfig::default();
    if logged {
        config = config.with_logger(Logger::new(NullSink));
        config.enable_metrics();
    }
    run(
        screens(),
        Drivers::new(),
        &Layout::single(LayoutComponent::new("Feed")),
        config,
    )
    .expect("navigator")
}

fn churn(navigator: &Navigator, depth: usize) {
    for _ in 0..depth {
        navigator
            .dispatch(Command::push(LayoutComponent::new("Item")))
            .expect("push");
    }
    navigator
        .dispatch(Command::push(
            LayoutComponent::new("Login").with_options(Options::left_menu_enabled(false)),
        ))
        .expect("push login");
    navigator.dispatch(Command::PopToRoot).expect("pop to root");
}

fn push_pop_churn(c: &mut Criterion) {
    c.bench_function("push_pop_churn", |b| {
        let navigator = build_navigator(false);
        b.iter(|| churn(&navigator, black_box(16)));
    });
}

fn push_pop_churn_logged(c: &mut Criterion) {
    c.bench_function("push_pop_churn_logged", |b| {
        let navigator = build_navigator(true);
        b.iter(|| churn(&navigator, black_box(16)));
    });
}

fn render_stack_view(c: &mut Criterion) {
    let navigator = build_navigator(false);
    for _ in 0..8 {
        navigator
            .dispatch(Command::push(LayoutComponent::new("Item")))
            .expect("push");
    }
    let view = navigator.view().latest().expect("view");
    c.bench_function("render_stack_view", |b| {
        b.iter(|| {
            let mut renderer = TerminalRenderer::with_size(Size::new(100, 30));
            let mut sink = io::sink();
            renderer
                .render(&mut sink, black_box(&view))
                .expect("render");
        });
    });
}

criterion_group!(benches, push_pop_churn, push_pop_churn_logged, render_stack_view);
criterion_main!(benches);
