// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.
mod api;
mod config;
mod context;
mod create;
mod database;
mod errors;
mod exec;
mod fdio;
mod files;
mod lifecycle;
mod materializer;
mod migration;
mod operation;
mod snapshot;
mod store;
#[cfg(test)]
mod test_support;

use crate::config::LxrdConfig;
use crate::context::ServerContext;

use clap::Parser;
use tracing::info;

pub async fn dmain() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let args = crate::config::LxrdConfigArg::parse();

    let config_path = args.config_path.clone();
    let mut config = if config_path.exists() {
        info!("loading configuration from {config_path:?}");
        let config_file = std::fs::OpenOptions::new().read(true).open(&config_path)?;
        serde_yaml::from_reader(config_file)?
    } else {
        LxrdConfig::default()
    };
    config.merge(args);
    info!("config: {config:#?}");

    config.prepare()?;

    let context = ServerContext::new(config)?;
    api::serve(context).await
}
