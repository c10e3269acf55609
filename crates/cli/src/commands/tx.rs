//! Ledger commands

use anyhow::Result;
use sacco_business::LedgerService;
use sacco_core::Transaction;

use super::{or_dash, print_json, session, short_date, truncate};
use crate::config::SaccoConfig;
use crate::{Cli, TxAction};

pub async fn handle(cli: &Cli, config: &SaccoConfig, action: &TxAction) -> Result<()> {
    let (_db, ctx) = session(config).await?;
    let ledger = LedgerService::new(&ctx);

    match action {
        TxAction::Deposit {
            member_id,
            amount,
            reference,
        } => {
            let tx = ledger.deposit(member_id, *amount, reference.as_deref()).await?;
            println!("✅ Deposit recorded: {} ({} {}, {})", tx.id, tx.amount, tx.currency, tx.status);
        }

        TxAction::Withdraw {
            member_id,
            amount,
            reference,
        } => {
            let tx = ledger.withdraw(member_id, *amount, reference.as_deref()).await?;
            println!("✅ Withdrawal requested: {} ({} {}, {})", tx.id, tx.amount, tx.currency, tx.status);
        }

        TxAction::Complete { transaction_id } => {
            let tx = ledger.complete(cli.actor()?, transaction_id).await?;
            println!("✅ Transaction {} completed", tx.id);
            println!("   Balance: {} → {}", tx.balance_before.unwrap_or_default(), tx.balance_after.unwrap_or_default());
        }

        TxAction::Reverse {
            transaction_id,
            reason,
        } => {
            let reversal = ledger.reverse(cli.actor()?, transaction_id, reason).await?;
            println!("↩️  {} reversed by {}", transaction_id, reversal.id);
            println!("   Balance: {}", reversal.balance_after.unwrap_or_default());
        }

        TxAction::Balance { member_id } => {
            let b = ledger.balance_breakdown(member_id).await?;
            if cli.json {
                return print_json(&b);
            }
            println!("💰 Balance for {}", b.member_id);
            println!("   Current:             {}", b.current_balance);
            println!("   Available:           {}", b.available_balance);
            println!("   Pending deposits:    {}", b.pending_deposits);
            println!("   Pending withdrawals: {}", b.pending_withdrawals);
            println!("   Share capital:       {}", b.share_capital);
            println!("   Savings:             {}", b.savings);
            println!("   Loan balance:        {}", b.loan_balance);
            println!("   Confirmed entries:   {}", b.confirmed_count);
        }

        TxAction::Statement {
            member_id,
            from,
            to,
        } => {
            let statement = ledger.statement(member_id, *from, *to).await?;
            if cli.json {
                return print_json(&statement);
            }
            println!("📄 Statement for {}", statement.member_id);
            println!("   Opening balance: {}", statement.opening_balance);
            print_transactions(&statement.entries);
            println!("   Credits:         {}", statement.total_credits);
            println!("   Debits:          {}", statement.total_debits);
            println!("   Closing balance: {}", statement.closing_balance);
        }

        TxAction::Reconcile { member_id } => {
            let check = ledger.reconcile(member_id).await?;
            if cli.json {
                return print_json(&check);
            }
            let stamped = check
                .stamped
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            if check.is_consistent {
                println!("✅ {} reconciles: {}", check.member_id, check.computed);
            } else {
                println!(
                    "❌ {} does not reconcile: computed {} vs stamped {}",
                    check.member_id, check.computed, stamped
                );
            }
        }

        TxAction::Pending => print_transactions(&ledger.pending().await?),

        TxAction::List { member } => {
            let txs = match member {
                Some(member_id) => ledger.list_for_member(member_id).await?,
                None => ledger.list_all().await?,
            };
            print_transactions(&txs);
        }
    }

    Ok(())
}

fn print_transactions(txs: &[Transaction]) {
    if txs.is_empty() {
        println!("No transactions found.");
        return;
    }
    println!(
        "{:<26} {:<10} {:<18} {:<6} {:>12} {:<10} {:<16} {:<10}",
        "ID", "MEMBER", "TYPE", "DIR", "AMOUNT", "STATUS", "REFERENCE", "DATE"
    );
    println!("{}", "-".repeat(114));
    for tx in txs {
        println!(
            "{:<26} {:<10} {:<18} {:<6} {:>12} {:<10} {:<16} {:<10}",
            tx.id,
            tx.member_id,
            tx.tx_type.as_str(),
            tx.direction.as_str(),
            tx.amount.to_string(),
            tx.status.as_str(),
            truncate(or_dash(tx.reference.as_deref()), 16),
            short_date(tx.processed_at.unwrap_or(tx.created_at))
        );
    }
}
