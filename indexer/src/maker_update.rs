use crate::policy::policy_for;
use crate::triggers::{HashUpdateTrigger, MakerUpdateTrigger};
use anyhow::Result;
use database::balances;
use database::orders::{self, OrderFilter};
use job_queue::{Job, JobQueues};
use model::order::{ApprovalStatus, Order, Side};
use model::Address;
use sqlx::PgPool;

/// Reacts to a balance or approval observation by approximately rechecking
/// every order it could plausibly affect, then "chasing its writes" with a
/// hash-update job per candidate so the exact, authoritative recomputation
/// always runs afterward. This worker's own writes can be wrong in the
/// conservative direction (an order left briefly stale) but never in the
/// direction of reporting an unfillable order as fillable, since the
/// hash-update that follows always has the final word.
pub struct MakerUpdateWorker {
    pool: PgPool,
    queues: JobQueues,
}

impl MakerUpdateWorker {
    pub fn new(pool: PgPool, queues: JobQueues) -> Self {
        Self { pool, queues }
    }

    /// Dequeues and processes one job. Returns `false` when the queue was
    /// empty, so a caller can poll in a loop without busy-spinning on errors.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.queues.maker_update.dequeue().await? else {
            return Ok(false);
        };
        match self.handle(&job).await {
            Ok(()) => self.queues.maker_update.complete(&job).await?,
            Err(err) => {
                tracing::warn!(?err, job_id = %job.id, "maker-update job failed, will retry");
                self.queues.maker_update.fail(job).await?;
            }
        }
        Ok(true)
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let trigger: MakerUpdateTrigger = serde_json::from_value(job.payload.clone())?;
        match trigger {
            MakerUpdateTrigger::BuyBalance { maker, contract } => {
                self.recheck_buy_balance(maker, contract).await
            }
            MakerUpdateTrigger::BuyApproval {
                maker,
                contract,
                operator,
                ..
            } => self.recheck_buy_approval(maker, contract, operator).await,
            MakerUpdateTrigger::SellBalance {
                maker,
                contract,
                token_id,
            } => self.recheck_sell_balance(maker, contract, token_id).await,
            MakerUpdateTrigger::SellApproval {
                maker,
                contract,
                operator,
            } => self.recheck_sell_approval(maker, contract, operator).await,
        }
    }

    async fn candidates(&self, maker: Address, side: Side) -> Result<Vec<Order>> {
        let filter = OrderFilter {
            maker: Some(maker),
            side: Some(side),
            ..Default::default()
        };
        Ok(orders::orders(&self.pool, &filter).await?)
    }

    async fn recheck_sell_balance(&self, maker: Address, contract: Address, token_id: primitive_types::U256) -> Result<()> {
        for order in self.candidates(maker, Side::Sell).await? {
            if order.token_set_id.contract_address() != Some(contract) {
                continue;
            }
            if !order.token_set_id.matches_token(contract, token_id) {
                continue;
            }
            let balance = balances::nft_balance(&self.pool, maker, contract, token_id).await?;
            let has_sufficient_balance =
                primitive_types::U256::from(balance.max(0) as u64) >= order.quantity_remaining;
            self.apply_balance_recheck(&order, has_sufficient_balance).await?;
        }
        Ok(())
    }

    async fn recheck_sell_approval(
        &self,
        maker: Address,
        contract: Address,
        operator: Address,
    ) -> Result<()> {
        // Only the maker's currently registered proxy can ever satisfy an
        // order's approval check; an approval change for any other operator
        // is irrelevant.
        if database::proxy_registry::get_proxy(&self.pool, maker).await? != Some(operator) {
            return Ok(());
        }
        for order in self.candidates(maker, Side::Sell).await? {
            if order.token_set_id.contract_address() != Some(contract) {
                continue;
            }
            let approved = balances::is_nft_approved(&self.pool, maker, contract, operator).await?;
            self.apply_approval_recheck(&order, approved).await?;
        }
        Ok(())
    }

    async fn recheck_buy_balance(&self, maker: Address, contract: Address) -> Result<()> {
        for order in self.candidates(maker, Side::Buy).await? {
            if order.payment_token != Some(contract) {
                continue;
            }
            let balance = balances::ft_balance(&self.pool, maker, contract).await?;
            self.apply_balance_recheck(&order, balance >= order.value).await?;
        }
        Ok(())
    }

    async fn recheck_buy_approval(
        &self,
        maker: Address,
        contract: Address,
        operator: Option<Address>,
    ) -> Result<()> {
        let Some(operator) = operator else {
            return Ok(());
        };
        if database::proxy_registry::get_proxy(&self.pool, maker).await? != Some(operator) {
            return Ok(());
        }
        for order in self.candidates(maker, Side::Buy).await? {
            if order.payment_token != Some(contract) {
                continue;
            }
            let allowance = balances::ft_allowance(&self.pool, maker, contract, operator).await?;
            // Approximate: the precise invariant accounts for the taker
            // relayer fee, which hash-update alone computes exactly.
            self.apply_approval_recheck(&order, allowance >= order.value).await?;
        }
        Ok(())
    }

    async fn apply_balance_recheck(&self, order: &Order, has_sufficient_balance: bool) -> Result<()> {
        let policy = policy_for(order.kind);
        let resolved = policy.resolve_balance_status(order.fillability_status, has_sufficient_balance);
        if resolved != order.fillability_status {
            orders::update_fillability_status(&self.pool, order.hash, resolved).await?;
        }
        self.chase(order.hash).await
    }

    async fn apply_approval_recheck(&self, order: &Order, approved: bool) -> Result<()> {
        let resolved = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::NoApproval
        };
        if resolved != order.approval_status {
            orders::update_approval_status(&self.pool, order.hash, resolved).await?;
        }
        self.chase(order.hash).await
    }

    /// Enqueues the authoritative hash-update for an order this worker just
    /// touched, so any imprecision in its own approximate recheck gets
    /// corrected shortly after.
    async fn chase(&self, hash: model::Hash32) -> Result<()> {
        let trigger = HashUpdateTrigger { hash };
        self.queues
            .hash_update
            .enqueue(&format!("chase-{}", hash), serde_json::to_value(&trigger)?)
            .await?;
        Ok(())
    }
}
