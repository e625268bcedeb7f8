//! The population annealing step loop.

use super::config::{PaConfig, ResamplingStrategy};
use super::memory;
use super::stats::StepStatistics;
use crate::error::{AnnealError, AnnealResult};
use crate::markov::Replica;
use crate::population::{ResamplingPopulation, WeightedSelector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One of the best replicas alive at the end of a run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Solution<S> {
    pub cost: f64,
    pub state: S,
}

/// What happened during one [`PopulationAnnealing::make_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Inverse temperature after the step.
    pub beta: f64,
    pub delta_beta: f64,
    /// Population size after the step.
    pub population: usize,
    /// `(1/R) * sum(family_size^2)`; 1 when no resampling took place.
    pub rho_t: f64,
    pub mean_cost: f64,
    pub var_cost: f64,
    pub restarted: bool,
}

/// Drives a population of replicas through an adaptive annealing schedule.
///
/// Each step sweeps every replica, measures the cost statistics, picks a
/// temperature increment with the configured [`ResamplingStrategy`],
/// resamples the population by Boltzmann weight and restarts from
/// `beta_start` once the population has lost its diversity.
///
/// Sweeps and weight computation run on the rayon pool. Reductions and
/// every draw from the master generator happen serially in population
/// order, so a fixed seed gives a reproducible run.
///
/// The stepping harness calls [`init`](Self::init) once, then
/// [`make_step`](Self::make_step) repeatedly, then
/// [`finalize`](Self::finalize). [`PaRunner`](super::PaRunner) is the
/// ready-made harness.
pub struct PopulationAnnealing<R: Replica> {
    config: PaConfig,
    strategy: ResamplingStrategy,
    blueprint: R,
    population: ResamplingPopulation<R>,
    rng: StdRng,
    pool: Option<ThreadPool>,
    scale_factor: f64,
    beta: f64,
    beta_start: f64,
    epoch: usize,
    restart_base: usize,
    target_population: usize,
    best: Option<(f64, R::State)>,
    evaluations: u64,
    deadline: Option<Instant>,
}

impl<R: Replica> PopulationAnnealing<R> {
    /// Validates `config`, checks that `config.population` replicas fit
    /// in memory and prepares an empty population.
    ///
    /// The blueprint is not cloned here; a failed admission check leaves
    /// no replica allocated.
    pub fn new(blueprint: R, config: PaConfig) -> AnnealResult<Self> {
        config.validate()?;

        let scale_factor = blueprint.scale_factor();
        if scale_factor.is_nan() || scale_factor <= 0.0 {
            return Err(AnnealError::InvalidConfig(format!(
                "scale factor must be positive, found {scale_factor}"
            )));
        }

        memory::check_admission(
            blueprint.memory_estimate(),
            config.population,
            config.memory_limit_bytes,
        )?;

        let strategy = match config.strategy {
            ResamplingStrategy::Schedule(schedule) => {
                ResamplingStrategy::Schedule(schedule.resolved(config.step_limit)?)
            }
            other => other,
        };

        let pool = match config.threads {
            Some(n) => Some(ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };

        let rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let beta_start = strategy.beta_start();

        Ok(Self {
            target_population: config.population,
            config,
            strategy,
            blueprint,
            population: ResamplingPopulation::new(),
            rng,
            pool,
            scale_factor,
            beta: beta_start,
            beta_start,
            epoch: 0,
            restart_base: 0,
            best: None,
            evaluations: 0,
            deadline: None,
        })
    }

    /// Seeds the population with `target_population` fresh replicas.
    ///
    /// Does nothing if the population already exists.
    pub fn init(&mut self) -> AnnealResult<()> {
        if !self.population.is_empty() {
            return Ok(());
        }
        if self.target_population == 0 {
            return Err(AnnealError::InvalidConfig(
                "target_population must be greater than 0".into(),
            ));
        }
        self.beta = self.beta_start;
        self.restart_base = 0;
        self.init_population();
        self.collect_progress();
        info!(
            population = self.population.len(),
            strategy = %self.strategy,
            beta_start = self.beta_start,
            "population annealing initialized"
        );
        Ok(())
    }

    /// Performs one annealing step.
    ///
    /// # Errors
    /// [`AnnealError::EmptyPopulation`] if called before [`init`](Self::init).
    pub fn make_step(&mut self, step: usize) -> AnnealResult<StepReport> {
        if self.population.is_empty() {
            return Err(AnnealError::EmptyPopulation("cannot step an empty population"));
        }

        let sweeps = self.config.sweeps_per_replica;
        let deadline = self.deadline;
        let costs = self.map_replicas(move |replica| {
            let before = replica.cost();
            // Sweeps can be long; skip them once the deadline has passed.
            if deadline.is_none_or(|d| Instant::now() < d) {
                replica.make_sweeps(sweeps);
            }
            (before, replica.cost())
        });
        self.collect_progress();

        let rd = costs.len() as f64;
        let (before, after): (Vec<f64>, Vec<f64>) = costs.into_iter().unzip();
        let stats = StepStatistics::compute(&before, after, sweeps);

        let delta_beta = self.strategy.choose_delta_beta(
            &stats,
            step.saturating_sub(self.restart_base),
            self.target_population,
            self.scale_factor,
        );

        let mut rho_t = 1.0;
        if delta_beta > 0.0 {
            self.resample(delta_beta, &stats.shifted_after);
            rho_t = self
                .population
                .families()
                .values()
                .map(|&size| (size * size) as f64)
                .sum::<f64>()
                / rd;
        }

        let restarted = rd / rho_t < self.config.alpha || stats.var_after == 0.0;
        if restarted {
            self.restart(step);
        } else {
            self.beta += delta_beta;
            let beta = self.beta;
            self.population.for_each_mut(|_, citizen| citizen.set_beta(beta));
        }

        debug!(
            step,
            epoch = self.epoch,
            beta = self.beta,
            delta_beta,
            population = self.population.len(),
            rho_t,
            mean_cost = stats.mean_after,
            "step"
        );

        Ok(StepReport {
            beta: self.beta,
            delta_beta,
            population: self.population.len(),
            rho_t,
            mean_cost: stats.mean_after,
            var_cost: stats.var_after,
            restarted,
        })
    }

    /// Collects the final best-seen values and returns up to
    /// `solutions_to_return` of the lowest-cost replicas currently alive,
    /// best first. Releases the recycle pool.
    pub fn finalize(&mut self) -> Vec<Solution<R::State>> {
        self.collect_progress();
        let n = self.config.solutions_to_return.min(self.population.len());
        self.population
            .partial_sort_by(n, |a, b| a.cost().total_cmp(&b.cost()));
        let solutions = self
            .population
            .iter()
            .take(n)
            .map(|citizen| Solution {
                cost: citizen.cost(),
                state: citizen.state().clone(),
            })
            .collect();
        self.population.release_recycled();
        solutions
    }

    /// Sweeps stop starting new work once `deadline` has passed.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Number of restarts so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn target_population(&self) -> usize {
        self.target_population
    }

    pub fn population(&self) -> &ResamplingPopulation<R> {
        &self.population
    }

    /// Lowest cost seen by any replica across all epochs.
    pub fn best_cost(&self) -> Option<f64> {
        self.best.as_ref().map(|(cost, _)| *cost)
    }

    pub fn best_state(&self) -> Option<&R::State> {
        self.best.as_ref().map(|(_, state)| state)
    }

    /// Total cost evaluations reported by the replicas.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Fills the population up to `target_population` from the blueprint,
    /// gives everyone a fresh family and a fresh random start.
    fn init_population(&mut self) {
        self.blueprint.set_beta(self.beta);
        self.population.reserve(self.target_population);
        while self.population.len() < self.target_population {
            self.population.insert_clone(&self.blueprint);
        }
        for i in 0..self.population.len() {
            self.population.assign_family(i, i);
        }
        self.reseed_all();
        self.map_replicas(|replica| replica.init());
    }

    /// Keeps the current members, grows back to `target_population` with
    /// freshly initialized ones and starts a new epoch for everyone.
    fn expand_population(&mut self) {
        self.blueprint.set_beta(self.beta);
        let kept = self.population.len();
        self.population.reserve(self.target_population);
        while self.population.len() < self.target_population {
            self.population.insert_clone(&self.blueprint);
        }
        for i in 0..self.population.len() {
            self.population.assign_family(i, i);
        }
        self.reseed_all();

        let beta = self.beta;
        self.population.for_each_mut(|position, citizen| {
            if position >= kept {
                citizen.init();
            }
            citizen.set_beta(beta);
        });
    }

    /// Starts a new epoch at `beta_start`.
    ///
    /// With `grow_on_restart` the target doubles, unless the doubled
    /// population fails the memory check, in which case it stays put.
    fn restart(&mut self, step: usize) {
        if self.config.grow_on_restart {
            let grown = self.target_population.saturating_mul(2);
            match memory::check_admission(
                self.blueprint.memory_estimate(),
                grown,
                self.config.memory_limit_bytes,
            ) {
                Ok(()) => self.target_population = grown,
                Err(err) => warn!(
                    target_population = self.target_population,
                    %err,
                    "keeping population size on restart"
                ),
            }
        }

        self.beta = self.beta_start;
        self.restart_base = step;

        let reserved = self
            .config
            .reserved_population
            .min(self.population.len())
            .min(self.target_population / 2);
        if reserved == 0 {
            self.population.clear();
            self.init_population();
        } else {
            self.population
                .partial_sort_by(reserved, |a, b| a.lowest_cost().total_cmp(&b.lowest_cost()));
            self.population.resize(reserved);
            self.expand_population();
        }
        self.collect_progress();

        self.epoch += 1;
        info!(
            step,
            epoch = self.epoch,
            population = self.population.len(),
            reserved,
            "restarting population"
        );
    }

    /// Marks every citizen with its number of offspring and applies them.
    fn resample(&mut self, delta_beta: f64, shifted_costs: &[f64]) {
        let n = self.population.len();
        if n == 0 {
            warn!("resampling empty population");
            return;
        }

        let scale = self.scale_factor;
        let weight = |&cost: &f64| (-delta_beta * cost * scale).exp();
        let weights: Vec<f64> = if self.config.parallel {
            let compute = || shifted_costs.par_iter().map(weight).collect::<Vec<f64>>();
            match &self.pool {
                Some(pool) => pool.install(compute),
                None => compute(),
            }
        } else {
            shifted_costs.iter().map(weight).collect()
        };
        // At least one shifted cost is 0, so the total is >= 1.
        let total_weight: f64 = weights.iter().sum();
        let target = self.target_population;

        if self.config.constant_population {
            let mut selector = WeightedSelector::with_capacity(n);
            let mut resampled = 0usize;
            for (i, w) in weights.iter().enumerate() {
                let relative = target as f64 * w / total_weight;
                let whole = relative.floor();
                self.population[i].set_count(whole as usize);
                selector.insert(i, relative - whole);
                resampled += whole as usize;
            }
            while resampled < target {
                match selector.select_and_remove(self.rng.random_range(0.0..1.0)) {
                    Some(i) => {
                        self.population[i].spawn(1);
                        resampled += 1;
                    }
                    None => break,
                }
            }
        } else {
            let offspring = poisson_offspring(&weights, total_weight, target, &mut self.rng);
            for (i, copies) in offspring.into_iter().enumerate() {
                self.population[i].set_count(copies);
            }
        }

        self.drop_surplus(target);
        self.population.resample();
        self.reseed_all();
    }

    /// Removes uniformly chosen pending copies until at most `target` remain.
    fn drop_surplus(&mut self, target: usize) {
        let total = self.population.total_count();
        if total <= target {
            return;
        }
        let copies: Vec<usize> = self
            .population
            .iter()
            .enumerate()
            .flat_map(|(position, citizen)| std::iter::repeat_n(position, citizen.count()))
            .collect();
        let surplus = rand::seq::index::sample(&mut self.rng, copies.len(), total - target);
        for k in surplus.iter() {
            let citizen = &mut self.population[copies[k]];
            let count = citizen.count();
            citizen.set_count(count - 1);
        }
    }

    /// Gives every replica its own stream drawn from the master generator.
    fn reseed_all(&mut self) {
        let Self { population, rng, .. } = self;
        population.for_each_mut(|_, citizen| citizen.reseed(rng.random()));
    }

    /// Folds the replicas' best-seen values and evaluation counters into
    /// the run totals.
    fn collect_progress(&mut self) {
        let Self {
            population,
            best,
            evaluations,
            ..
        } = self;
        population.for_each_mut(|_, citizen| {
            *evaluations += citizen.take_evaluations();
            let cost = citizen.lowest_cost();
            match best {
                Some((best_cost, best_state)) => {
                    if cost < *best_cost {
                        *best_cost = cost;
                        best_state.clone_from(citizen.lowest_state());
                    }
                }
                None => *best = Some((cost, citizen.lowest_state().clone())),
            }
        });
    }

    fn map_replicas<T, F>(&mut self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&mut R) -> T + Sync + Send,
    {
        let Self {
            population,
            pool,
            config,
            ..
        } = self;
        if !config.parallel {
            return population.map_mut(f);
        }
        match pool {
            Some(pool) => pool.install(|| population.par_map_mut(f)),
            None => population.par_map_mut(f),
        }
    }
}

/// Draws `floor(Poisson(target * w / total_weight))` offspring per weight.
///
/// If every draw comes out 0, one uniformly chosen entry gets a single
/// offspring so the population never dies out.
fn poisson_offspring<G: Rng>(
    weights: &[f64],
    total_weight: f64,
    target: usize,
    rng: &mut G,
) -> Vec<usize> {
    let rrq = target as f64 / total_weight;
    let mut offspring: Vec<usize> = weights
        .iter()
        .map(|w| {
            let mean = rrq * w;
            match Poisson::new(mean) {
                Ok(poisson) if mean > 0.0 => poisson.sample(&mut *rng).floor() as usize,
                _ => 0,
            }
        })
        .collect();
    if !offspring.is_empty() && offspring.iter().all(|&copies| copies == 0) {
        let i = rng.random_range(0..offspring.len());
        offspring[i] = 1;
    }
    offspring
}
