//! Operator CLI: query state governance dan kelola voting intents.
//!
//! Semua command membaca store yang ditulis node. Hanya `intents` yang
//! mengubah sesuatu, yaitu file JSON intents lokal.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;

use crate::consensus_params::ConsensusParamsPos;
use crate::dao::engine::{ConsultationResult, ProposalFilter};
use crate::dao::vote_script::VoteTarget;
use crate::destination::{AddressType, OwnedKeys};
use crate::index::address::history_filter;
use crate::index::token::TokenId;
use crate::types::{Amount, Hash160, Hash256, StakerScript, COIN};
use crate::DaoChain;

#[derive(Parser)]
#[command(name = "stock-dao", about = "Stock DAO governance tools")]
pub struct Cli {
    /// File config TOML. Kalau tidak ada, default dipakai.
    #[arg(long, default_value = "stock.toml")]
    pub config: PathBuf,

    /// Override `data_dir` dari config.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Override `network` dari config (main, test, regtest).
    #[arg(long)]
    pub network: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    // ═══════════════════════════════════════════════════════════
    // CHAIN
    // ═══════════════════════════════════════════════════════════

    /// Tip, jumlah object governance dan saldo fund
    Status {},

    /// Semua parameter konsensus pada tip (`getconsensusparameters`)
    Params {
        /// Satu parameter saja, by name (e.g. VOTING_CYCLE_LENGTH)
        #[arg(long)]
        name: Option<String>,
    },

    // ═══════════════════════════════════════════════════════════
    // FUND
    // ═══════════════════════════════════════════════════════════

    /// Daftar proposal (`listproposals`)
    Proposals {
        /// all | accepted | rejected | expired | pending | accepted_expired | mine
        #[arg(long, default_value = "all")]
        filter: String,
        /// Key hash (hex) milik wallet untuk filter `mine`
        #[arg(long)]
        owner: Vec<String>,
    },

    /// Payment request milik satu proposal
    PaymentRequests { proposal: String },

    // ═══════════════════════════════════════════════════════════
    // CONSULTATION
    // ═══════════════════════════════════════════════════════════

    /// Daftar consultation beserta answer
    Consultations {},

    /// Answer atau nilai yang menang untuk consultation
    ConsultationResult { consultation: String },

    // ═══════════════════════════════════════════════════════════
    // VOTES & INDEX
    // ═══════════════════════════════════════════════════════════

    /// Vote yang tercatat untuk staking script (`getstakervote`)
    StakerVotes { script: String },

    /// Delta history address per block (`getaddresshistory`)
    AddressHistory {
        hash: String,
        /// Hash kedua (cold staking); default sama dengan `hash`
        #[arg(long)]
        hash2: Option<String>,
        #[arg(long, default_value = "0")]
        start: u32,
        #[arg(long, default_value_t = u32::MAX)]
        end: u32,
        /// spendable | stakable | voting | generated, dipisah koma
        #[arg(long)]
        filter: Option<String>,
    },

    /// Balance dan total received dari address delta index
    AddressBalance { hash: String },

    /// Token UTXO yang dibuat dalam range height
    TokenUtxos {
        token: String,
        #[arg(long)]
        subid: Option<u64>,
        #[arg(long, default_value = "0")]
        from: u32,
        #[arg(long, default_value_t = u32::MAX)]
        to: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // INTENTS
    // ═══════════════════════════════════════════════════════════

    /// Kelola vote lokal yang dimasukkan ke coinstake
    Intents {
        #[command(subcommand)]
        command: IntentCommand,
    },
}

#[derive(Subcommand)]
pub enum IntentCommand {
    /// Vote list proposal dan payment request (`proposalvotelist`)
    List {},
    /// Set vote: yes | no | abstain, atau angka untuk range consultation
    Vote { hash: String, value: String },
    /// Dukung consultation / answer di support phase
    Support { hash: String },
    /// Tarik dukungan
    Unsupport { hash: String },
    /// Hapus vote dari daftar
    Remove { hash: String },
    /// Script vote (hex) untuk coinstake berikutnya
    Scripts {},
}

// ------------------- HELPERS -------------------

fn load_config(cli: &Cli) -> Result<stock_common::Config> {
    let mut cfg = if cli.config.exists() {
        stock_common::load_from_file(&cli.config)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?
    } else {
        stock_common::Config::default()
    };
    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = Some(dir.clone());
    }
    if let Some(network) = &cli.network {
        cfg.network = Some(network.clone());
    }
    Ok(cfg)
}

fn parse_hash(s: &str) -> Result<Hash256> {
    Hash256::from_str(s).with_context(|| format!("invalid hash: {}", s))
}

fn parse_hash160(s: &str) -> Result<Hash160> {
    Hash160::from_hex(s.strip_prefix("0x").unwrap_or(s)).with_context(|| format!("invalid key hash: {}", s))
}

fn parse_vote_value(s: &str) -> Result<i64> {
    match s.to_ascii_lowercase().as_str() {
        "yes" => Ok(crate::dao::VOTE_YES),
        "no" => Ok(crate::dao::VOTE_NO),
        "abstain" | "abs" => Ok(crate::dao::VOTE_ABSTAIN),
        other => other.parse::<i64>().with_context(|| format!("invalid vote value: {}", s)),
    }
}

fn parse_history_filter(s: &str) -> Result<u8> {
    let mut bits = 0;
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        bits |= match part {
            "spendable" => history_filter::SPENDABLE,
            "stakable" => history_filter::STAKABLE,
            "voting" => history_filter::VOTING_WEIGHT,
            "generated" => history_filter::GENERATED,
            other => anyhow::bail!("unknown history filter: {}", other),
        };
    }
    Ok(bits)
}

fn format_coin(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let coin = COIN.unsigned_abs();
    format!("{}{}.{:08}", sign, abs / coin, abs % coin)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ------------------- RUN -------------------

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let chain = DaoChain::open(&cfg)?;
    run_command(&chain, &cli.cmd)
}

pub fn run_command(chain: &DaoChain, cmd: &Commands) -> Result<()> {
    match cmd {
        // ==================== STATUS ====================
        Commands::Status {} => {
            let engine = chain.engine();
            let state = engine.state();
            let tip = engine.tip();
            println!("═══════════════════════════════════════════════════════════");
            println!("🏛  GOVERNANCE STATUS ({})", engine.settings().network);
            println!("═══════════════════════════════════════════════════════════");
            match tip {
                Some(h) => println!("   Tip Height:       {}", h),
                None => println!("   Tip Height:       (empty)"),
            }
            println!("   Proposals:        {}", state.proposals.len());
            println!("   Payment Requests: {}", state.payment_requests.len());
            println!("   Consultations:    {}", state.consultations.len());
            println!("   Answers:          {}", state.answers.len());
            println!("   Fund Available:   {}", format_coin(engine.fund_available(tip.unwrap_or(0))));
            println!("═══════════════════════════════════════════════════════════");
        }

        // ==================== PARAMS ====================
        Commands::Params { name } => match name {
            Some(name) => {
                let id = ConsensusParamsPos::from_str(name)?;
                print_json(&json!({ "id": id.index(), "name": id.name(), "value": chain.consensus_parameter(id) }))?;
            }
            None => print_json(&serde_json::to_value(chain.consensus_parameters())?)?,
        },

        // ==================== PROPOSALS ====================
        Commands::Proposals { filter, owner } => {
            let owned = owner
                .iter()
                .map(|h| parse_hash160(h))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .fold(OwnedKeys::default(), OwnedKeys::with_key);
            let filter = match filter.as_str() {
                "all" => ProposalFilter::All,
                "accepted" => ProposalFilter::Accepted,
                "rejected" => ProposalFilter::Rejected,
                "expired" => ProposalFilter::Expired,
                "pending" => ProposalFilter::Pending,
                "accepted_expired" => ProposalFilter::AcceptedExpired,
                "mine" => ProposalFilter::Mine(&owned),
                other => anyhow::bail!("unknown proposal filter: {}", other),
            };
            let engine = chain.engine();
            let tip = engine.tip().unwrap_or(0);
            let rows: Vec<serde_json::Value> = engine
                .list_proposals(&filter)
                .into_iter()
                .map(|p| {
                    json!({
                        "hash": p.hash,
                        "description": p.description,
                        "amount": format_coin(p.amount),
                        "available": engine.proposal_available(&p.hash, tip).unwrap_or(0),
                        "deadline": p.deadline,
                        "state": p.state_at(tip).to_string(),
                        "cycles": p.completed_cycles(tip),
                        "super": p.is_super(),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }

        Commands::PaymentRequests { proposal } => {
            let proposal = parse_hash(proposal)?;
            let engine = chain.engine();
            if !engine.state().proposals.contains_key(&proposal) {
                anyhow::bail!("proposal {} not found", proposal);
            }
            let tip = engine.tip().unwrap_or(0);
            let rows: Vec<serde_json::Value> = engine
                .payment_requests(&proposal)
                .into_iter()
                .map(|pr| {
                    json!({
                        "hash": pr.hash,
                        "description": pr.description,
                        "amount": format_coin(pr.amount),
                        "state": pr.state_at(tip).to_string(),
                        "cycles": pr.completed_cycles(tip),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }

        // ==================== CONSULTATIONS ====================
        Commands::Consultations {} => {
            let engine = chain.engine();
            let tip = engine.tip().unwrap_or(0);
            let rows: Vec<serde_json::Value> = engine
                .list_consultations()
                .into_iter()
                .map(|c| {
                    let answers: Vec<serde_json::Value> = engine
                        .consultation_answers(&c.hash)
                        .into_iter()
                        .map(|a| json!({ "hash": a.hash, "value": a.value, "state": a.state_at(tip).to_string() }))
                        .collect();
                    json!({
                        "hash": c.hash,
                        "question": c.question,
                        "kind": c.kind,
                        "state": c.state_at(tip).to_string(),
                        "cycles": c.completed_cycles(tip),
                        "answers": answers,
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }

        Commands::ConsultationResult { consultation } => {
            let hash = parse_hash(consultation)?;
            match chain.engine().consultation_result(&hash) {
                Some(ConsultationResult::Answer(answer)) => println!("answer {}", answer),
                Some(ConsultationResult::Value(value)) => println!("value {}", value),
                None => println!("no result"),
            }
        }

        // ==================== VOTES ====================
        Commands::StakerVotes { script } => {
            let staker = StakerScript::from_str(script)?;
            let engine = chain.engine();
            let Some(votes) = engine.staker_votes(&staker) else {
                println!("no votes recorded for {}", staker.to_hex());
                return Ok(());
            };
            print_json(&serde_json::to_value(votes)?)?;
        }

        // ==================== INDEX ====================
        Commands::AddressHistory { hash, hash2, start, end, filter } => {
            let hash = parse_hash160(hash)?;
            let hash2 = match hash2 {
                Some(h) => parse_hash160(h)?,
                None => hash,
            };
            let bits = match filter {
                Some(f) => parse_history_filter(f)?,
                None => 0,
            };
            let rows: Vec<serde_json::Value> = chain
                .address_history(hash, hash2, *start, *end, bits)?
                .into_iter()
                .map(|(key, value)| {
                    json!({
                        "height": key.block_height,
                        "txindex": key.txindex,
                        "txid": key.txhash,
                        "time": key.time,
                        "spendable": value.spendable,
                        "stakable": value.stakable,
                        "voting_weight": value.voting_weight,
                        "generated": value.is_generated(),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }

        Commands::AddressBalance { hash } => {
            let hash = parse_hash160(hash)?;
            let (balance, received) = chain.address_balance(AddressType::PubKeyHash, hash)?;
            println!("   Balance:  {}", format_coin(balance));
            println!("   Received: {}", format_coin(received));
        }

        Commands::TokenUtxos { token, subid, from, to } => {
            let token = parse_hash(token)?;
            let id = match subid {
                Some(subid) => TokenId::nft(token, *subid),
                None => TokenId::fungible(token),
            };
            let rows: Vec<serde_json::Value> = chain
                .token_utxos(&id, *from, *to)?
                .into_iter()
                .map(|(key, value)| {
                    json!({
                        "height": key.height,
                        "txid": value.hash,
                        "n": value.n,
                        "spending_key": hex::encode(&value.spending_key),
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(rows))?;
        }

        // ==================== INTENTS ====================
        Commands::Intents { command } => run_intents(chain, command)?,
    }
    Ok(())
}

fn run_intents(chain: &DaoChain, command: &IntentCommand) -> Result<()> {
    match command {
        IntentCommand::List {} => {
            let engine = chain.engine();
            let tip = engine.tip().unwrap_or(0);
            let intents = chain.intents.read();
            print_json(&json!({
                "proposals": intents.proposal_vote_list(engine.state(), tip),
                "payment_requests": intents.payment_request_vote_list(engine.state(), tip),
                "supported": intents.supported(),
            }))?;
        }

        IntentCommand::Vote { hash, value } => {
            let hash = parse_hash(hash)?;
            let value = parse_vote_value(value)?;
            let target = {
                let engine = chain.engine();
                let state = engine.state();
                if state.proposals.contains_key(&hash) {
                    VoteTarget::Proposal
                } else if state.payment_requests.contains_key(&hash) {
                    VoteTarget::PaymentRequest
                } else if state.consultations.contains_key(&hash) {
                    VoteTarget::Consultation
                } else {
                    anyhow::bail!("{} is not a proposal, payment request or consultation", hash);
                }
            };
            chain.update_intents(|i| match target {
                VoteTarget::Proposal => i.proposal_vote(hash, value),
                VoteTarget::PaymentRequest => i.payment_request_vote(hash, value),
                _ => i.consultation_vote(hash, value),
            })?;
            println!("✅ vote {} recorded for {}", value, hash);
        }

        IntentCommand::Support { hash } => {
            let hash = parse_hash(hash)?;
            chain.update_intents(|i| i.support(hash))?;
            println!("✅ supporting {}", hash);
        }

        IntentCommand::Unsupport { hash } => {
            let hash = parse_hash(hash)?;
            chain.update_intents(|i| i.remove_support(&hash))?;
            println!("✅ support removed for {}", hash);
        }

        IntentCommand::Remove { hash } => {
            let hash = parse_hash(hash)?;
            chain.update_intents(|i| i.remove(&hash))?;
            println!("✅ vote removed for {}", hash);
        }

        IntentCommand::Scripts {} => {
            for script in chain.coinstake_vote_scripts()? {
                println!("{}", hex::encode(script));
            }
        }
    }
    if chain.intents_path().is_none() && !matches!(command, IntentCommand::List {} | IntentCommand::Scripts {}) {
        tracing::warn!("intents_file not configured, change is not persisted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vote_value() {
        assert_eq!(parse_vote_value("YES").unwrap(), 1);
        assert_eq!(parse_vote_value("no").unwrap(), 0);
        assert_eq!(parse_vote_value("abs").unwrap(), -1);
        assert_eq!(parse_vote_value("250").unwrap(), 250);
        assert!(parse_vote_value("maybe").is_err());
    }

    #[test]
    fn test_parse_history_filter() {
        assert_eq!(parse_history_filter("").unwrap(), 0);
        assert_eq!(
            parse_history_filter("spendable, generated").unwrap(),
            history_filter::SPENDABLE | history_filter::GENERATED
        );
        assert!(parse_history_filter("cold").is_err());
    }

    #[test]
    fn test_format_coin() {
        assert_eq!(format_coin(150_000_000), "1.50000000");
        assert_eq!(format_coin(-1), "-0.00000001");
        assert_eq!(format_coin(0), "0.00000000");
    }

    #[test]
    fn test_cli_parses_nested_intents() {
        let cli = Cli::try_parse_from(["stock-dao", "--network", "regtest", "intents", "vote", "ab", "yes"]).unwrap();
        assert_eq!(cli.network.as_deref(), Some("regtest"));
        match cli.cmd {
            Commands::Intents { command: IntentCommand::Vote { hash, value } } => {
                assert_eq!(hash, "ab");
                assert_eq!(value, "yes");
            }
            _ => panic!("wrong command"),
        }
    }
}
