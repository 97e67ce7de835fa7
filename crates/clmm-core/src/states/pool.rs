//! The pool state machine: coordinates the tick table, bitmap, positions and
//! oracle under the swap loop and liquidity operations.
//!
//! Every public mutating operation is atomic: on any error the pool restores
//! its entry snapshot, so a failed operation leaves no state changes visible.
//! Asset settlement happens through a [`SettlementHost`]; the pool trusts
//! the host's callbacks to move assets and then verifies its own balance
//! deltas.

use std::collections::BTreeMap;

use ahash::AHashMap;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::full_math::MulDiv;
use crate::libraries::{
    fixed_point_128, liquidity_math, sqrt_price_math, swap_math, tick_math,
};
use crate::states::config::{Address, PoolConfig, FEE_RATE_DENOMINATOR_VALUE};
use crate::states::oracle::{Observation, ObservationState};
use crate::states::position::{PositionKey, PositionState};
use crate::states::tick::{self, TickState};
use crate::states::tick_bitmap::TickBitmap;

/// The pool summary, updated atomically at the end of every swap
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Slot0 {
    /// The current price of the pool as a Q64.96 sqrt(token_1/token_0)
    pub sqrt_price_x96: U256,
    /// The current tick, i.e. the greatest tick whose price is at most the
    /// current price
    pub tick: i32,
    /// The index of the last written oracle observation
    pub observation_index: u16,
    /// The current maximum number of observations that are being stored
    pub observation_cardinality: u16,
    /// The next maximum number of observations to store, triggered on the
    /// write that fills the current window
    pub observation_cardinality_next: u16,
}

/// The external collaborators of the pool, seen as one seam: the pool's own
/// token balances, outward transfers, and the settlement callbacks.
///
/// Callbacks are synchronous upcalls made while the pool's bookkeeping is
/// already updated; only asset balances remain to be reconciled, and the
/// post-callback balance check is the sole mechanism enforcing payment. A
/// callback must not reenter any mutating pool operation.
pub trait SettlementHost {
    /// The pool's current balance of token_0
    fn balance_0(&self) -> u128;
    /// The pool's current balance of token_1
    fn balance_1(&self) -> u128;

    /// Transfer `amount` of token_0 out of the pool. Returns false when the
    /// transfer could not be performed.
    fn pay_0(&mut self, to: Address, amount: u128) -> bool;
    /// Transfer `amount` of token_1 out of the pool.
    fn pay_1(&mut self, to: Address, amount: u128) -> bool;

    /// Must transfer the owed token amounts into the pool before returning.
    fn mint_callback(&mut self, amount_0_owed: u128, amount_1_owed: u128, data: &[u8]);
    /// Signed deltas; the positive side is owed to the pool by the caller.
    fn swap_callback(&mut self, amount_0_delta: i128, amount_1_delta: i128, data: &[u8]);
    /// Must return the flash principals plus these fees before returning.
    fn flash_callback(&mut self, fee_0: u128, fee_1: u128, data: &[u8]);
}

// swap loop state, committed to the pool only after the loop finishes
struct SwapState {
    amount_specified_remaining: u128,
    amount_calculated: u128,
    sqrt_price_x96: U256,
    tick: i32,
    fee_growth_global_x128: U256,
    liquidity: u128,
}

#[derive(Default)]
struct StepComputations {
    sqrt_price_start_x96: U256,
    tick_next: i32,
    initialized: bool,
    sqrt_price_next_x96: U256,
    amount_in: u128,
    amount_out: u128,
    fee_amount: u128,
}

/// A concentrated liquidity pool for one pair of tokens
#[derive(Clone, Debug, PartialEq)]
pub struct PoolState {
    token_0: Address,
    token_1: Address,
    /// The trade fee, denominated in hundredths of a bip (10^-6)
    fee: u32,
    tick_spacing: i32,
    max_liquidity_per_tick: u128,

    slot_0: Slot0,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    /// The liquidity currently in range
    liquidity: u128,

    ticks: BTreeMap<i32, TickState>,
    tick_bitmap: TickBitmap,
    positions: AHashMap<PositionKey, PositionState>,
    observations: ObservationState,

    unlocked: bool,
}

impl PoolState {
    pub fn new(config: PoolConfig) -> Result<Self, ErrorCode> {
        config.validate()?;
        Ok(PoolState {
            token_0: config.token_0,
            token_1: config.token_1,
            fee: config.fee,
            tick_spacing: config.tick_spacing,
            max_liquidity_per_tick: tick::tick_spacing_to_max_liquidity_per_tick(
                config.tick_spacing,
            ),
            slot_0: Slot0::default(),
            fee_growth_global_0_x128: U256::default(),
            fee_growth_global_1_x128: U256::default(),
            liquidity: 0,
            ticks: BTreeMap::new(),
            tick_bitmap: TickBitmap::default(),
            positions: AHashMap::new(),
            observations: ObservationState::default(),
            unlocked: true,
        })
    }

    // ------------------------------------------------------------------
    // read accessors
    // ------------------------------------------------------------------

    pub fn token_0(&self) -> Address {
        self.token_0
    }

    pub fn token_1(&self) -> Address {
        self.token_1
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn tick_spacing(&self) -> i32 {
        self.tick_spacing
    }

    pub fn max_liquidity_per_tick(&self) -> u128 {
        self.max_liquidity_per_tick
    }

    pub fn slot_0(&self) -> Slot0 {
        self.slot_0
    }

    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_growth_global_0_x128(&self) -> U256 {
        self.fee_growth_global_0_x128
    }

    pub fn fee_growth_global_1_x128(&self) -> U256 {
        self.fee_growth_global_1_x128
    }

    pub fn tick(&self, tick: i32) -> Option<&TickState> {
        self.ticks.get(&tick)
    }

    pub fn bitmap_word(&self, word_pos: i16) -> U256 {
        self.tick_bitmap.word(word_pos)
    }

    pub fn position(
        &self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Option<&PositionState> {
        self.positions.get(&PositionKey {
            owner,
            tick_lower,
            tick_upper,
        })
    }

    pub fn observation(&self, index: u16) -> Option<&Observation> {
        self.observations.get(index)
    }

    /// Cumulative tick as of each `seconds_ago` before `time`. See
    /// [`ObservationState::observe`].
    pub fn observe(&self, time: u32, seconds_agos: &[u32]) -> Result<Vec<i64>, ErrorCode> {
        self.observations.observe(
            time,
            seconds_agos,
            self.slot_0.tick,
            self.slot_0.observation_index,
            self.slot_0.observation_cardinality,
        )
    }

    // ------------------------------------------------------------------
    // operations
    // ------------------------------------------------------------------

    /// Sets the initial price and writes the first oracle observation.
    ///
    /// # Arguments
    ///
    /// * `time` - The current block timestamp, truncated to 32 bits
    /// * `sqrt_price_x96` - The initial sqrt price of the pool as a Q64.96
    ///
    pub fn initialize(&mut self, time: u32, sqrt_price_x96: U256) -> Result<(), ErrorCode> {
        self.transactional(|pool| {
            if !pool.slot_0.sqrt_price_x96.is_zero() {
                return Err(ErrorCode::AlreadyInitialized);
            }
            let tick = tick_math::get_tick_at_sqrt_price(sqrt_price_x96)?;
            let (cardinality, cardinality_next) = pool.observations.initialize(time);
            pool.slot_0 = Slot0 {
                sqrt_price_x96,
                tick,
                observation_index: 0,
                observation_cardinality: cardinality,
                observation_cardinality_next: cardinality_next,
            };
            info!(%sqrt_price_x96, tick, "initialize");
            Ok(())
        })
    }

    /// Adds liquidity for the given owner/range, callback-settled.
    ///
    /// The owed token amounts are computed from the range's relation to the
    /// current price, the host's `mint_callback` must pay them in, and the
    /// pool verifies its balances grew accordingly.
    ///
    /// # Arguments
    ///
    /// * `host` - Settlement surface; `mint_callback` is invoked on it
    /// * `owner` - The account the minted liquidity is credited to
    /// * `tick_lower` - The lower tick of the range
    /// * `tick_upper` - The upper tick of the range
    /// * `amount` - The liquidity to mint
    /// * `time` - The current block timestamp
    /// * `data` - Opaque bytes forwarded to the callback
    ///
    /// Returns the token_0 and token_1 amounts paid in
    pub fn mint<H: SettlementHost>(
        &mut self,
        host: &mut H,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
        data: &[u8],
    ) -> Result<(u128, u128), ErrorCode> {
        self.transactional(|pool| {
            pool.lock()?;
            pool.require_initialized()?;
            if amount == 0 {
                return Err(ErrorCode::ZeroLiquidity);
            }
            let liquidity_delta = i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(owner, tick_lower, tick_upper, liquidity_delta, time)?;

            // positive delta owes non-negative amounts
            let amount_0 = amount_0_int as u128;
            let amount_1 = amount_1_int as u128;

            let balance_0_before = if amount_0 > 0 { host.balance_0() } else { 0 };
            let balance_1_before = if amount_1 > 0 { host.balance_1() } else { 0 };
            host.mint_callback(amount_0, amount_1, data);
            if amount_0 > 0 {
                let owed = balance_0_before
                    .checked_add(amount_0)
                    .ok_or(ErrorCode::Overflow)?;
                if host.balance_0() < owed {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            }
            if amount_1 > 0 {
                let owed = balance_1_before
                    .checked_add(amount_1)
                    .ok_or(ErrorCode::Overflow)?;
                if host.balance_1() < owed {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            }

            pool.unlocked = true;
            info!(%owner, tick_lower, tick_upper, amount, amount_0, amount_1, "mint");
            Ok((amount_0, amount_1))
        })
    }

    /// Removes liquidity from the sender's position. No tokens move here:
    /// the withdrawn amounts, and any fees accrued, are credited to the
    /// position's `tokens_owed` and retrieved through [`PoolState::collect`].
    ///
    /// `amount = 0` is a poke: it recomputes the position's fee debt without
    /// touching liquidity.
    ///
    /// Returns the token_0 and token_1 amounts credited
    pub fn burn(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(u128, u128), ErrorCode> {
        self.transactional(|pool| {
            pool.lock()?;
            pool.require_initialized()?;
            let liquidity_delta = i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(owner, tick_lower, tick_upper, -liquidity_delta, time)?;

            // negative delta frees non-negative amounts
            let amount_0 = amount_0_int.unsigned_abs();
            let amount_1 = amount_1_int.unsigned_abs();

            if amount_0 > 0 || amount_1 > 0 {
                let position = pool
                    .positions
                    .get_mut(&PositionKey {
                        owner,
                        tick_lower,
                        tick_upper,
                    })
                    .expect("position exists after modify");
                position.tokens_owed_0 = position
                    .tokens_owed_0
                    .checked_add(amount_0)
                    .ok_or(ErrorCode::Overflow)?;
                position.tokens_owed_1 = position
                    .tokens_owed_1
                    .checked_add(amount_1)
                    .ok_or(ErrorCode::Overflow)?;
            }

            pool.unlocked = true;
            info!(%owner, tick_lower, tick_upper, amount, amount_0, amount_1, "burn");
            Ok((amount_0, amount_1))
        })
    }

    /// Transfers owed tokens out of the pool, up to the requested amounts.
    /// Fees must have been accounted first, via `burn` (possibly with a zero
    /// amount) or any liquidity change on the position.
    ///
    /// Returns the token_0 and token_1 amounts collected
    pub fn collect<H: SettlementHost>(
        &mut self,
        host: &mut H,
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128), ErrorCode> {
        self.transactional(|pool| {
            pool.lock()?;
            let key = PositionKey {
                owner,
                tick_lower,
                tick_upper,
            };
            let (amount_0, amount_1) = if let Some(position) = pool.positions.get_mut(&key) {
                let amount_0 = amount_0_requested.min(position.tokens_owed_0);
                let amount_1 = amount_1_requested.min(position.tokens_owed_1);
                position.tokens_owed_0 -= amount_0;
                position.tokens_owed_1 -= amount_1;
                (amount_0, amount_1)
            } else {
                (0, 0)
            };

            if amount_0 > 0 && !host.pay_0(recipient, amount_0) {
                return Err(ErrorCode::TransferFailed);
            }
            if amount_1 > 0 && !host.pay_1(recipient, amount_1) {
                return Err(ErrorCode::TransferFailed);
            }

            pool.unlocked = true;
            info!(%owner, %recipient, tick_lower, tick_upper, amount_0, amount_1, "collect");
            Ok((amount_0, amount_1))
        })
    }

    /// Swaps an exact `amount_specified` of the input token for as much of
    /// the other token as the in-range liquidity allows, never moving the
    /// price past `sqrt_price_limit_x96`.
    ///
    /// # Arguments
    ///
    /// * `host` - Settlement surface; output is paid to `recipient` before
    ///   `swap_callback` collects the input
    /// * `recipient` - The account paid the output tokens
    /// * `zero_for_one` - The direction: true when token_0 is swapped in for
    ///   token_1 (price decreases)
    /// * `amount_specified` - The exact input amount
    /// * `sqrt_price_limit_x96` - The price beyond which the swap will not
    ///   proceed; leftover input is simply not consumed
    /// * `time` - The current block timestamp
    /// * `data` - Opaque bytes forwarded to the callback
    ///
    /// Returns the signed (token_0, token_1) deltas from the pool's point of
    /// view: positive amounts are owed to the pool, negative amounts were
    /// paid out
    pub fn swap<H: SettlementHost>(
        &mut self,
        host: &mut H,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: u128,
        sqrt_price_limit_x96: U256,
        time: u32,
        data: &[u8],
    ) -> Result<(i128, i128), ErrorCode> {
        self.transactional(|pool| {
            pool.swap_inner(
                host,
                recipient,
                zero_for_one,
                amount_specified,
                sqrt_price_limit_x96,
                time,
                data,
            )
        })
    }

    fn swap_inner<H: SettlementHost>(
        &mut self,
        host: &mut H,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: u128,
        sqrt_price_limit_x96: U256,
        time: u32,
        data: &[u8],
    ) -> Result<(i128, i128), ErrorCode> {
        self.lock()?;
        self.require_initialized()?;
        if amount_specified == 0 {
            return Err(ErrorCode::ZeroAmountSpecified);
        }

        let slot_0_start = self.slot_0;
        if zero_for_one {
            if sqrt_price_limit_x96 >= slot_0_start.sqrt_price_x96
                || sqrt_price_limit_x96 <= tick_math::MIN_SQRT_PRICE_X96
            {
                return Err(ErrorCode::InvalidPriceLimit);
            }
        } else if sqrt_price_limit_x96 <= slot_0_start.sqrt_price_x96
            || sqrt_price_limit_x96 >= tick_math::MAX_SQRT_PRICE_X96
        {
            return Err(ErrorCode::InvalidPriceLimit);
        }

        let liquidity_start = self.liquidity;
        let mut cached_tick_cumulative: Option<i64> = None;

        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: 0,
            sqrt_price_x96: slot_0_start.sqrt_price_x96,
            tick: slot_0_start.tick,
            fee_growth_global_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            liquidity: liquidity_start,
        };

        // continue swapping as long as we haven't used the entire input and
        // haven't reached the price limit
        while state.amount_specified_remaining > 0 && state.sqrt_price_x96 != sqrt_price_limit_x96
        {
            let mut step = StepComputations {
                sqrt_price_start_x96: state.sqrt_price_x96,
                ..Default::default()
            };

            let (tick_next, initialized) = self.tick_bitmap.next_initialized_tick_within_one_word(
                state.tick,
                self.tick_spacing,
                zero_for_one,
            );
            step.tick_next = tick_next.clamp(tick_math::MIN_TICK, tick_math::MAX_TICK);
            step.initialized = initialized;
            step.sqrt_price_next_x96 = tick_math::get_sqrt_price_at_tick(step.tick_next)?;

            // the target for this step is the closer of the next tick's
            // price and the caller's limit
            let sqrt_price_target_x96 = if (zero_for_one
                && step.sqrt_price_next_x96 < sqrt_price_limit_x96)
                || (!zero_for_one && step.sqrt_price_next_x96 > sqrt_price_limit_x96)
            {
                sqrt_price_limit_x96
            } else {
                step.sqrt_price_next_x96
            };

            let swap_step = swap_math::compute_swap_step(
                state.sqrt_price_x96,
                sqrt_price_target_x96,
                state.liquidity,
                state.amount_specified_remaining,
                self.fee,
            )?;
            state.sqrt_price_x96 = swap_step.sqrt_price_next_x96;
            step.amount_in = swap_step.amount_in;
            step.amount_out = swap_step.amount_out;
            step.fee_amount = swap_step.fee_amount;

            state.amount_specified_remaining = state
                .amount_specified_remaining
                .checked_sub(step.amount_in + step.fee_amount)
                .ok_or(ErrorCode::Overflow)?;
            state.amount_calculated = state
                .amount_calculated
                .checked_add(step.amount_out)
                .ok_or(ErrorCode::Overflow)?;

            // update the global fee tracker; the growth accumulator is modular at
            // 2^256
            if state.liquidity > 0 {
                let fee_growth_delta = U256::from(step.fee_amount)
                    .mul_div_floor(fixed_point_128::Q128, U256::from(state.liquidity))
                    .ok_or(ErrorCode::Overflow)?;
                state.fee_growth_global_x128 =
                    state.fee_growth_global_x128.overflowing_add(fee_growth_delta).0;
            }

            // shift tick if we reached the next tick's price
            if state.sqrt_price_x96 == step.sqrt_price_next_x96 {
                // if the tick is initialized, run the tick transition
                if step.initialized {
                    let tick_cumulative = match cached_tick_cumulative {
                        Some(value) => value,
                        None => {
                            let value = self.observations.observe_single(
                                time,
                                0,
                                slot_0_start.tick,
                                slot_0_start.observation_index,
                                slot_0_start.observation_cardinality,
                            )?;
                            cached_tick_cumulative = Some(value);
                            value
                        }
                    };
                    // the input token's accumulator is the fresh one from
                    // this loop; the other side keeps its stored global
                    let tick_state = self
                        .ticks
                        .get_mut(&step.tick_next)
                        .expect("initialized tick has a table entry");
                    let mut liquidity_net = tick_state.cross(
                        if zero_for_one {
                            state.fee_growth_global_x128
                        } else {
                            self.fee_growth_global_0_x128
                        },
                        if zero_for_one {
                            self.fee_growth_global_1_x128
                        } else {
                            state.fee_growth_global_x128
                        },
                        tick_cumulative,
                    );
                    // leaving the range leftward applies the net in reverse
                    if zero_for_one {
                        liquidity_net = liquidity_net.checked_neg().ok_or(ErrorCode::Overflow)?;
                    }
                    state.liquidity = liquidity_math::add_delta(state.liquidity, liquidity_net)
                        .map_err(|_| ErrorCode::NotEnoughLiquidity)?;
                }

                // the crossed tick's price belongs to the upper range, so
                // moving down lands one below it
                state.tick = if zero_for_one {
                    step.tick_next - 1
                } else {
                    step.tick_next
                };
            } else if state.sqrt_price_x96 != step.sqrt_price_start_x96 {
                // recompute unless we're on a lower tick boundary (i.e.
                // already transitioned ticks), and haven't moved
                state.tick = tick_math::get_tick_at_sqrt_price(state.sqrt_price_x96)?;
            }

            debug!(
                tick = state.tick,
                amount_in = step.amount_in,
                amount_out = step.amount_out,
                fee_amount = step.fee_amount,
                remaining = state.amount_specified_remaining,
                "swap step"
            );
        }

        // write an oracle observation with the pre-swap tick: only the first
        // price of a block is recorded, which resists intra-block
        // manipulation
        if state.tick != slot_0_start.tick {
            let (observation_index, observation_cardinality) = self.observations.write(
                slot_0_start.observation_index,
                time,
                slot_0_start.tick,
                slot_0_start.observation_cardinality,
                slot_0_start.observation_cardinality_next,
            );
            self.slot_0.observation_index = observation_index;
            self.slot_0.observation_cardinality = observation_cardinality;
            self.slot_0.tick = state.tick;
        }
        self.slot_0.sqrt_price_x96 = state.sqrt_price_x96;

        if liquidity_start != state.liquidity {
            self.liquidity = state.liquidity;
        }

        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_x128;
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_x128;
        }

        let amount_consumed = amount_specified
            .checked_sub(state.amount_specified_remaining)
            .ok_or(ErrorCode::Overflow)?;
        let consumed = i128::try_from(amount_consumed).map_err(|_| ErrorCode::Overflow)?;
        let calculated = i128::try_from(state.amount_calculated).map_err(|_| ErrorCode::Overflow)?;
        let (amount_0, amount_1) = if zero_for_one {
            (consumed, -calculated)
        } else {
            (-calculated, consumed)
        };

        // settle: pay the output first, then collect the input through the
        // callback and verify the balance delta
        if zero_for_one {
            if amount_1 < 0 && !host.pay_1(recipient, amount_1.unsigned_abs()) {
                return Err(ErrorCode::TransferFailed);
            }
            let balance_0_before = host.balance_0();
            host.swap_callback(amount_0, amount_1, data);
            let owed = balance_0_before
                .checked_add(amount_0 as u128)
                .ok_or(ErrorCode::Overflow)?;
            if host.balance_0() < owed {
                return Err(ErrorCode::InsufficientInputAmount);
            }
        } else {
            if amount_0 < 0 && !host.pay_0(recipient, amount_0.unsigned_abs()) {
                return Err(ErrorCode::TransferFailed);
            }
            let balance_1_before = host.balance_1();
            host.swap_callback(amount_0, amount_1, data);
            let owed = balance_1_before
                .checked_add(amount_1 as u128)
                .ok_or(ErrorCode::Overflow)?;
            if host.balance_1() < owed {
                return Err(ErrorCode::InsufficientInputAmount);
            }
        }

        self.unlocked = true;
        info!(
            %recipient,
            zero_for_one,
            amount_0,
            amount_1,
            sqrt_price_x96 = %state.sqrt_price_x96,
            liquidity = state.liquidity,
            tick = state.tick,
            "swap"
        );
        Ok((amount_0, amount_1))
    }

    /// Lends the requested amounts for the duration of `flash_callback`,
    /// requiring them back plus the pool fee. Paid fees are credited to the
    /// fee growth accumulators, so they accrue to in-range liquidity.
    pub fn flash<H: SettlementHost>(
        &mut self,
        host: &mut H,
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
        data: &[u8],
    ) -> Result<(), ErrorCode> {
        self.transactional(|pool| {
            pool.lock()?;
            pool.require_initialized()?;
            if pool.liquidity == 0 {
                return Err(ErrorCode::NotEnoughLiquidity);
            }

            let fee_0 = amount_0
                .mul_div_ceil(pool.fee as u128, FEE_RATE_DENOMINATOR_VALUE as u128)
                .ok_or(ErrorCode::Overflow)?;
            let fee_1 = amount_1
                .mul_div_ceil(pool.fee as u128, FEE_RATE_DENOMINATOR_VALUE as u128)
                .ok_or(ErrorCode::Overflow)?;

            let balance_0_before = host.balance_0();
            let balance_1_before = host.balance_1();

            if amount_0 > 0 && !host.pay_0(recipient, amount_0) {
                return Err(ErrorCode::TransferFailed);
            }
            if amount_1 > 0 && !host.pay_1(recipient, amount_1) {
                return Err(ErrorCode::TransferFailed);
            }

            host.flash_callback(fee_0, fee_1, data);

            let balance_0_after = host.balance_0();
            let balance_1_after = host.balance_1();
            if balance_0_after
                < balance_0_before
                    .checked_add(fee_0)
                    .ok_or(ErrorCode::Overflow)?
                || balance_1_after
                    < balance_1_before
                        .checked_add(fee_1)
                        .ok_or(ErrorCode::Overflow)?
            {
                return Err(ErrorCode::FlashLoanNotPaid);
            }

            // whatever was paid beyond the principal accrues to in-range
            // liquidity, like any other fee
            let paid_0 = balance_0_after - balance_0_before;
            let paid_1 = balance_1_after - balance_1_before;
            if paid_0 > 0 {
                let growth = U256::from(paid_0)
                    .mul_div_floor(fixed_point_128::Q128, U256::from(pool.liquidity))
                    .ok_or(ErrorCode::Overflow)?;
                pool.fee_growth_global_0_x128 =
                    pool.fee_growth_global_0_x128.overflowing_add(growth).0;
            }
            if paid_1 > 0 {
                let growth = U256::from(paid_1)
                    .mul_div_floor(fixed_point_128::Q128, U256::from(pool.liquidity))
                    .ok_or(ErrorCode::Overflow)?;
                pool.fee_growth_global_1_x128 =
                    pool.fee_growth_global_1_x128.overflowing_add(growth).0;
            }

            pool.unlocked = true;
            info!(%recipient, amount_0, amount_1, paid_0, paid_1, "flash");
            Ok(())
        })
    }

    /// Raises the target capacity of the oracle ring. The new slots activate
    /// as the write cursor reaches them.
    pub fn increase_observation_cardinality_next(
        &mut self,
        observation_cardinality_next: u16,
    ) -> Result<(), ErrorCode> {
        self.transactional(|pool| {
            pool.lock()?;
            pool.require_initialized()?;
            let old = pool.slot_0.observation_cardinality_next;
            let new = pool
                .observations
                .grow(old, observation_cardinality_next);
            pool.slot_0.observation_cardinality_next = new;
            pool.unlocked = true;
            if old != new {
                info!(old, new, "increase_observation_cardinality_next");
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Runs `operation` all-or-nothing: on error the pool is restored to the
    /// entry snapshot. Host-side effects are the host's to unwind.
    fn transactional<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<T, ErrorCode>,
    ) -> Result<T, ErrorCode> {
        let checkpoint = self.clone();
        match operation(self) {
            Ok(value) => Ok(value),
            Err(error) => {
                *self = checkpoint;
                Err(error)
            }
        }
    }

    fn lock(&mut self) -> Result<(), ErrorCode> {
        if !self.unlocked {
            return Err(ErrorCode::ReentrancyLock);
        }
        self.unlocked = false;
        Ok(())
    }

    fn require_initialized(&self) -> Result<(), ErrorCode> {
        if self.slot_0.sqrt_price_x96.is_zero() {
            return Err(ErrorCode::NotInitialized);
        }
        Ok(())
    }

    fn check_ticks(&self, tick_lower: i32, tick_upper: i32) -> Result<(), ErrorCode> {
        if tick_lower >= tick_upper
            || tick_lower < tick_math::MIN_TICK
            || tick_upper > tick_math::MAX_TICK
            || tick_lower % self.tick_spacing != 0
            || tick_upper % self.tick_spacing != 0
        {
            return Err(ErrorCode::InvalidTickRange);
        }
        Ok(())
    }

    /// Applies a liquidity delta to a position and returns the signed token
    /// amounts it moves: positive owed to the pool, negative owed to the
    /// owner.
    fn modify_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<(i128, i128), ErrorCode> {
        self.check_ticks(tick_lower, tick_upper)?;
        self.update_position(owner, tick_lower, tick_upper, liquidity_delta, time)?;

        let mut amount_0 = 0;
        let mut amount_1 = 0;
        if liquidity_delta != 0 {
            let tick_current = self.slot_0.tick;
            (amount_0, amount_1) = sqrt_price_math::get_amounts_delta_signed(
                tick_current,
                self.slot_0.sqrt_price_x96,
                tick_lower,
                tick_upper,
                liquidity_delta,
            )?;
            // an active range also changes the pool's in-range liquidity
            if tick_current >= tick_lower && tick_current < tick_upper {
                self.liquidity = liquidity_math::add_delta(self.liquidity, liquidity_delta)?;
            }
        }
        Ok((amount_0, amount_1))
    }

    /// Updates the range's boundary ticks and the owner's position,
    /// crediting fees accrued since the last touch.
    fn update_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<(), ErrorCode> {
        let tick_current = self.slot_0.tick;
        let fee_growth_global_0_x128 = self.fee_growth_global_0_x128;
        let fee_growth_global_1_x128 = self.fee_growth_global_1_x128;

        let mut flipped_lower = false;
        let mut flipped_upper = false;
        if liquidity_delta != 0 {
            let tick_cumulative = self.observations.observe_single(
                time,
                0,
                tick_current,
                self.slot_0.observation_index,
                self.slot_0.observation_cardinality,
            )?;

            let max_liquidity_per_tick = self.max_liquidity_per_tick;
            let lower = self
                .ticks
                .entry(tick_lower)
                .or_insert_with(|| TickState::new(tick_lower));
            flipped_lower = lower.update(
                tick_current,
                liquidity_delta,
                fee_growth_global_0_x128,
                fee_growth_global_1_x128,
                tick_cumulative,
                false,
                max_liquidity_per_tick,
            )?;
            let upper = self
                .ticks
                .entry(tick_upper)
                .or_insert_with(|| TickState::new(tick_upper));
            flipped_upper = upper.update(
                tick_current,
                liquidity_delta,
                fee_growth_global_0_x128,
                fee_growth_global_1_x128,
                tick_cumulative,
                true,
                max_liquidity_per_tick,
            )?;

            if flipped_lower {
                self.tick_bitmap.flip_tick(tick_lower, self.tick_spacing);
            }
            if flipped_upper {
                self.tick_bitmap.flip_tick(tick_upper, self.tick_spacing);
            }
        }

        let lower_state = self
            .ticks
            .get(&tick_lower)
            .copied()
            .unwrap_or_else(|| TickState::new(tick_lower));
        let upper_state = self
            .ticks
            .get(&tick_upper)
            .copied()
            .unwrap_or_else(|| TickState::new(tick_upper));
        let (fee_growth_inside_0_x128, fee_growth_inside_1_x128) = tick::get_fee_growth_inside(
            &lower_state,
            &upper_state,
            tick_current,
            fee_growth_global_0_x128,
            fee_growth_global_1_x128,
        );

        let position = self
            .positions
            .entry(PositionKey {
                owner,
                tick_lower,
                tick_upper,
            })
            .or_default();
        position.update(
            liquidity_delta,
            fee_growth_inside_0_x128,
            fee_growth_inside_1_x128,
        )?;

        // ticks whose gross liquidity dropped to zero are destroyed, along
        // with their snapshots and bitmap bits
        if liquidity_delta < 0 {
            if flipped_lower {
                self.ticks.remove(&tick_lower);
            }
            if flipped_upper {
                self.ticks.remove(&tick_upper);
            }
        }
        Ok(())
    }
}
