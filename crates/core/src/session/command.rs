//! REPL line parsing.

use anyhow::{bail, Context, Result};

/// What a wallet should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletAction {
    Balances,
    Wrap { amount: String },
    Swap { amount: String },
    UpdatePrice { price: String },
    Open {
        qty: String,
        taker_margin: String,
        maker_margin: String,
        max_fee: Option<String>,
    },
    Close { position_id: u64 },
    Claim { position_id: u64 },
    Positions,
    AddLiquidity { fee_rate: i16, amount: String },
    ClaimLiquidity { receipt_id: u64 },
    RemoveLiquidity { fee_rate: i16, amount: String },
    WithdrawLiquidity { receipt_id: u64 },
    Receipts,
}

/// One REPL input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Wallets,
    Exit,
    Wallet { wallet: String, action: WalletAction },
}

pub const HELP: &str = "\
commands:
  help | wallets | exit
  <wallet> balances
  <wallet> wrap <eth>
  <wallet> swap <eth>                      swap ETH for the settlement token
  <wallet> price <price>                   push an oracle price (mock provider)
  <wallet> open <qty> <taker> <maker> [max-fee]
  <wallet> close <position-id>
  <wallet> claim <position-id>
  <wallet> positions
  <wallet> add-liquidity <fee-rate> <amount>
  <wallet> claim-liquidity <receipt-id>
  <wallet> remove-liquidity <fee-rate> <clb-amount>
  <wallet> withdraw-liquidity <receipt-id>
  <wallet> receipts
wallets: deployer alice bob charlie david eve frank grace";

fn arg<'a>(args: &[&'a str], i: usize, name: &str) -> Result<&'a str> {
    args.get(i)
        .copied()
        .with_context(|| format!("missing <{name}>"))
}

fn number<T: std::str::FromStr>(args: &[&str], i: usize, name: &str) -> Result<T> {
    let text = arg(args, i, name)?;
    text.parse()
        .map_err(|_| anyhow::anyhow!("<{name}>: not a number: {text}"))
}

impl ReplCommand {
    /// Parse a line; `Ok(None)` for blank lines and comments.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            ["help"] | ["?"] => Self::Help,
            ["wallets"] => Self::Wallets,
            ["exit"] | ["quit"] => Self::Exit,
            [wallet, action, rest @ ..] => Self::Wallet {
                wallet: wallet.to_lowercase(),
                action: parse_action(action, rest)?,
            },
            [other] => bail!("unknown command '{other}', try 'help'"),
            [] => return Ok(None),
        };
        Ok(Some(command))
    }
}

fn parse_action(action: &str, args: &[&str]) -> Result<WalletAction> {
    let action = match action {
        "balances" | "balance" => WalletAction::Balances,
        "wrap" => WalletAction::Wrap {
            amount: arg(args, 0, "eth")?.to_string(),
        },
        "swap" => WalletAction::Swap {
            amount: arg(args, 0, "eth")?.to_string(),
        },
        "price" => WalletAction::UpdatePrice {
            price: arg(args, 0, "price")?.to_string(),
        },
        "open" => WalletAction::Open {
            qty: arg(args, 0, "qty")?.to_string(),
            taker_margin: arg(args, 1, "taker")?.to_string(),
            maker_margin: arg(args, 2, "maker")?.to_string(),
            max_fee: args.get(3).map(|s| s.to_string()),
        },
        "close" => WalletAction::Close {
            position_id: number(args, 0, "position-id")?,
        },
        "claim" => WalletAction::Claim {
            position_id: number(args, 0, "position-id")?,
        },
        "positions" => WalletAction::Positions,
        "add-liquidity" => WalletAction::AddLiquidity {
            fee_rate: number(args, 0, "fee-rate")?,
            amount: arg(args, 1, "amount")?.to_string(),
        },
        "claim-liquidity" => WalletAction::ClaimLiquidity {
            receipt_id: number(args, 0, "receipt-id")?,
        },
        "remove-liquidity" => WalletAction::RemoveLiquidity {
            fee_rate: number(args, 0, "fee-rate")?,
            amount: arg(args, 1, "clb-amount")?.to_string(),
        },
        "withdraw-liquidity" => WalletAction::WithdrawLiquidity {
            receipt_id: number(args, 0, "receipt-id")?,
        },
        "receipts" => WalletAction::Receipts,
        other => bail!("unknown action '{other}', try 'help'"),
    };
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_builtins() {
        assert_eq!(ReplCommand::parse("   ").unwrap(), None);
        assert_eq!(ReplCommand::parse("# note").unwrap(), None);
        assert_eq!(ReplCommand::parse("help").unwrap(), Some(ReplCommand::Help));
        assert_eq!(ReplCommand::parse("wallets").unwrap(), Some(ReplCommand::Wallets));
        assert_eq!(ReplCommand::parse(" exit ").unwrap(), Some(ReplCommand::Exit));
    }

    #[test]
    fn test_wallet_actions() {
        assert_eq!(
            ReplCommand::parse("Alice open 10 5 50").unwrap(),
            Some(ReplCommand::Wallet {
                wallet: "alice".to_string(),
                action: WalletAction::Open {
                    qty: "10".to_string(),
                    taker_margin: "5".to_string(),
                    maker_margin: "50".to_string(),
                    max_fee: None,
                },
            })
        );
        assert_eq!(
            ReplCommand::parse("bob add-liquidity -10 100").unwrap(),
            Some(ReplCommand::Wallet {
                wallet: "bob".to_string(),
                action: WalletAction::AddLiquidity {
                    fee_rate: -10,
                    amount: "100".to_string(),
                },
            })
        );
        assert_eq!(
            ReplCommand::parse("bob close 3").unwrap(),
            Some(ReplCommand::Wallet {
                wallet: "bob".to_string(),
                action: WalletAction::Close { position_id: 3 },
            })
        );
    }

    #[test]
    fn test_errors() {
        assert!(ReplCommand::parse("frobnicate").is_err());
        assert!(ReplCommand::parse("alice fly").is_err());
        assert!(ReplCommand::parse("alice close").is_err());
        let err = ReplCommand::parse("alice close x").unwrap_err();
        assert!(err.to_string().contains("position-id"));
    }
}
