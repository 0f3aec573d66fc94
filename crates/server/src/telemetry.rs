// Copyright 2026 RingKV Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use logforth::append;
use logforth::append::rolling_file::RollingFileBuilder;
use logforth::diagnostic::StaticDiagnostic;
use logforth::filter::EnvFilter;
use logforth::filter::env_filter::EnvFilterBuilder;
use logforth::layout;
use ringkv_core::TelemetryConfig;

/// Initializes logging from the telemetry config: an optional rolling file
/// appender and an optional stderr appender, each with its own filter. The
/// node's advertised address travels on every record as a diagnostic.
pub fn init(service_name: &'static str, node_addr: &str, config: &TelemetryConfig) {
    let static_diagnostic = {
        let mut static_diagnostic = StaticDiagnostic::default();
        static_diagnostic.insert("node", node_addr.to_string());
        static_diagnostic
    };

    let mut builder = logforth::builder();

    // file appender
    if let Some(file) = &config.logs.file {
        let mut b = RollingFileBuilder::new(&file.dir)
            .layout(layout::JsonLayout::default())
            .rotation(logforth::append::rolling_file::Rotation::Hourly)
            .filename_prefix(service_name)
            .filename_suffix("log");

        if let Some(max_files) = file.max_files {
            b = b.max_log_files(max_files.into());
        }

        let (append, guard) = b.build().expect("failed to init file appender");
        std::mem::forget(guard);
        builder = builder.dispatch(|b| {
            b.filter(make_rust_log_filter(&file.filter))
                .diagnostic(static_diagnostic.clone())
                .append(append)
        });
    }

    // stderr appender
    if let Some(stderr) = &config.logs.stderr {
        builder = builder.dispatch(|b| {
            b.filter(make_rust_log_filter_with_default_env(&stderr.filter))
                .diagnostic(static_diagnostic.clone())
                .append(append::Stderr::default().with_layout(layout::TextLayout::default()))
        });
    }

    // apply returns err if already set; ignored
    let _ = builder.try_apply();
}

fn make_rust_log_filter(filter: &str) -> EnvFilter {
    let builder = EnvFilterBuilder::new()
        .try_parse(filter)
        .unwrap_or_else(|_| panic!("failed to parse filter: {filter}"));
    EnvFilter::new(builder)
}

fn make_rust_log_filter_with_default_env(filter: &str) -> EnvFilter {
    if let Ok(spec) = std::env::var("RUST_LOG") {
        make_rust_log_filter(&spec)
    } else {
        make_rust_log_filter(filter)
    }
}
