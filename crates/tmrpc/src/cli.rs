use clap::{Parser, Subcommand, ValueEnum};

use tmrpc_core::requests::QueryTag;

/// tmrpc: query and follow a Tendermint node over JSON-RPC.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Node RPC address: http(s)://, ws(s):// or a bare host:port.
    #[arg(long, default_value = "http://127.0.0.1:26657", env = "TMRPC_URL")]
    pub url: String,

    /// Protocol version to assume (`0.20` or `0.25`). Detected from the node
    /// when omitted.
    #[arg(long, env = "TMRPC_NODE_VERSION")]
    pub node_version: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Throttle outbound HTTP requests.
    #[arg(long)]
    pub requests_per_second: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Node identity, sync state and validator info.
    Status,

    /// A block by height, or the latest one.
    Block { height: Option<u64> },

    /// Look up a committed transaction by its hex hash.
    Tx {
        hash: String,
        #[arg(long)]
        prove: bool,
    },

    /// Search committed transactions by tag and height.
    Search {
        /// `key=value` tag clause (repeatable).
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<QueryTag>,
        #[arg(long)]
        height: Option<u64>,
        #[arg(long)]
        min_height: Option<u64>,
        #[arg(long)]
        max_height: Option<u64>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
        /// Follow pages until every match is fetched.
        #[arg(long)]
        all: bool,
    },

    /// Submit a transaction given as hex.
    Broadcast {
        tx: String,
        #[arg(long, value_enum, default_value = "sync")]
        mode: BroadcastMode,
    },

    /// Stream events until interrupted. Requires a ws:// URL.
    Watch {
        #[arg(value_enum)]
        kind: WatchKind,
        /// Tag filter for `txs` (repeatable).
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<QueryTag>,
    },

    /// Print the chain height each time it changes. Requires a ws:// URL.
    Height,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BroadcastMode {
    Async,
    Sync,
    Commit,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum WatchKind {
    Blocks,
    Headers,
    Txs,
}

fn parse_tag(raw: &str) -> Result<QueryTag, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(QueryTag::new(key, value)),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_tags() {
        let cli = Cli::try_parse_from([
            "tmrpc",
            "--url",
            "ws://node:26657",
            "search",
            "--tag",
            "app.key=abc",
            "--min-height",
            "5",
            "--all",
        ])
        .expect("valid arguments");
        assert_eq!(cli.url, "ws://node:26657");
        match cli.command {
            Command::Search {
                tags,
                min_height,
                all,
                ..
            } => {
                assert_eq!(tags, vec![QueryTag::new("app.key", "abc")]);
                assert_eq!(min_height, Some(5));
                assert!(all);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn rejects_tag_without_separator() {
        assert!(parse_tag("app.key").is_err());
        assert!(parse_tag("=abc").is_err());
    }
}
