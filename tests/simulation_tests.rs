#[cfg(test)]
mod tests {
    use epoch_engine::batch::{run_batch, BatchConfig, BatchError, CancelToken};
    use epoch_engine::demo::{reference_simulation, DemoWorld};
    use epoch_engine::{
        AdvanceTimePhase, EngineConfig, EngineError, Event, EventRetention, FnPhase, HarvestPhase,
        InteractionCache, LogBounds, NoActor, PhaseError, PhaseOutcome, SimClock, SimRng,
        Simulation, StepContext, World,
    };
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct CounterWorld {
        clock: SimClock,
        x: f64,
    }

    impl World for CounterWorld {
        type Actor = NoActor;
        fn clock(&self) -> &SimClock {
            &self.clock
        }
        fn clock_mut(&mut self) -> &mut SimClock {
            &mut self.clock
        }
    }

    type Ctx<'a> = StepContext<'a, NoActor>;

    /// Emits `n` events per step.
    fn chatter(n: usize) -> impl epoch_engine::Phase<CounterWorld> + 'static {
        FnPhase::new("chatter", "Chatter", 10.0, move |_w: &mut CounterWorld, _r: &mut SimRng, ctx: &mut Ctx<'_>| {
            for i in 0..n {
                ctx.emit(Event::new("chatter", format!("#{}", i)));
            }
            Ok(PhaseOutcome::empty())
        })
    }

    fn counter_sim(config: EngineConfig) -> Simulation<CounterWorld> {
        Simulation::new(CounterWorld::default(), 1, config).unwrap()
    }

    fn demo_json(seed: u64, steps: u64) -> (String, String) {
        let mut sim = reference_simulation(DemoWorld::default(), seed, EngineConfig::default()).unwrap();
        let summary = sim.run(steps, EventRetention::Full).unwrap();
        (
            serde_json::to_string(&summary).unwrap(),
            serde_json::to_string(sim.world()).unwrap(),
        )
    }

    // ========== Determinism ==========

    #[test]
    fn test_same_seed_is_byte_identical() {
        let (events_a, world_a) = demo_json(42, 60);
        let (events_b, world_b) = demo_json(42, 60);
        assert_eq!(events_a, events_b, "event streams diverged for a fixed seed");
        assert_eq!(world_a, world_b, "terminal worlds diverged for a fixed seed");
    }

    #[test]
    fn test_different_seeds_diverge() {
        let (_, world_a) = demo_json(1, 60);
        let (_, world_b) = demo_json(2, 60);
        assert_ne!(world_a, world_b);
    }

    #[test]
    fn test_parallel_batch_matches_serial() {
        let factory = |seed| reference_simulation(DemoWorld::default(), seed, EngineConfig::default());
        let base = BatchConfig { runs: 4, max_steps: 36, parallel: false, ..BatchConfig::default() };
        let serial = run_batch(&base, &CancelToken::new(), factory).unwrap();
        let parallel = run_batch(&BatchConfig { parallel: true, ..base.clone() }, &CancelToken::new(), factory).unwrap();

        assert_eq!(serial.completed.len(), 4);
        for (a, b) in serial.completed.iter().zip(parallel.completed.iter()) {
            assert_eq!(a.summary.seed, b.summary.seed, "batch output must stay in seed order");
            assert_eq!(a.world, b.world);
            assert_eq!(a.summary.rng_draws, b.summary.rng_draws);
        }
    }

    // ========== Ordering ==========

    #[test]
    fn test_lower_order_mutations_visible_same_step() {
        let mut sim = counter_sim(EngineConfig::default());
        sim.register(FnPhase::new("reader", "Reader", 20.0, |w: &mut CounterWorld, _r: &mut SimRng, ctx: &mut Ctx<'_>| {
            ctx.emit(Event::new("read", "x").with_details(json!(w.x)));
            Ok(PhaseOutcome::empty())
        }))
        .unwrap();
        sim.register(FnPhase::new("writer", "Writer", 10.0, |w: &mut CounterWorld, _r: &mut SimRng, ctx: &mut Ctx<'_>| {
            w.x = ctx.step() as f64 + 1.0;
            Ok(PhaseOutcome::empty())
        }))
        .unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();

        for k in 0..5u64 {
            let report = sim.step().unwrap();
            assert_eq!(report.events[0].details, Some(json!(k as f64 + 1.0)));
        }
    }

    /// Phases registered C, A, B. A writes a draw into the world, B reads it
    /// back and C only reports that it ran.
    fn three_phase_sim(seed: u64) -> Simulation<CounterWorld> {
        let mut sim = Simulation::new(CounterWorld::default(), seed, EngineConfig::default()).unwrap();
        sim.register(FnPhase::new("C", "C", 30.0, |_w: &mut CounterWorld, _r: &mut SimRng, _c: &mut Ctx<'_>| {
            Ok(PhaseOutcome::with_events(vec![Event::new("ran", "C")]))
        }))
        .unwrap();
        sim.register(FnPhase::new("A", "A", 10.0, |w: &mut CounterWorld, r: &mut SimRng, _c: &mut Ctx<'_>| {
            w.x = r.next_f64();
            Ok(PhaseOutcome::with_events(vec![Event::new("ran", "A")]))
        }))
        .unwrap();
        sim.register(FnPhase::new("B", "B", 20.0, |w: &mut CounterWorld, _r: &mut SimRng, _c: &mut Ctx<'_>| {
            Ok(PhaseOutcome::with_events(vec![Event::new("ran", "B").with_details(json!(w.x))]))
        }))
        .unwrap();
        sim.register(HarvestPhase::new()).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();
        sim
    }

    #[test]
    fn test_three_phase_scenario() {
        let mut sim = three_phase_sim(11);
        let report = sim.step().unwrap();
        let order: Vec<&str> = report.harvested.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert!(report.harvested.iter().all(|e| e.step == Some(0)));
        assert_eq!(sim.current_step(), 1);
        // B saw the value A wrote earlier in the same step
        assert_eq!(report.harvested[1].details, Some(json!(sim.world().x)));

        let mut first = Vec::new();
        let mut replay = three_phase_sim(11);
        let mut again = Vec::new();
        first.push(report.harvested);
        again.push(replay.step().unwrap().harvested);
        for _ in 0..4 {
            first.push(sim.step().unwrap().harvested);
            again.push(replay.step().unwrap().harvested);
        }
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&again).unwrap()
        );
        assert_eq!(sim.world(), replay.world());
    }

    // ========== Time Advancement ==========

    #[test]
    fn test_clock_advances_without_advance_phase() {
        let mut sim = counter_sim(EngineConfig::default());
        sim.register(chatter(1)).unwrap();
        sim.register(HarvestPhase::new()).unwrap();

        for k in 0..3u64 {
            let report = sim.step().unwrap();
            assert_eq!(report.step, k);
            assert_eq!(report.harvested.len(), 1, "step {} re-harvested earlier events", k);
            assert_eq!(report.harvested[0].step, Some(k));
        }

        let summary = sim.run(5, EventRetention::Full).unwrap();
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.final_step, 8);
        assert_eq!(summary.event_count, 5);
        let tags: Vec<Option<u64>> = summary.events.iter().map(|e| e.step).collect();
        assert_eq!(tags, (3..8).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn test_advance_phase_is_not_doubled() {
        let mut sim = counter_sim(EngineConfig::default());
        sim.register(chatter(1)).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();
        let summary = sim.run(4, EventRetention::Summary).unwrap();
        assert_eq!(summary.final_step, 4);
    }

    // ========== Event Log Bounding ==========

    fn bounded(threshold: usize, lookback: u64) -> EngineConfig {
        EngineConfig {
            log: LogBounds { prune_threshold: threshold, lookback_steps: lookback },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_harvest_exact_after_pruning() {
        let mut sim = counter_sim(bounded(40, 2));
        sim.register(chatter(15)).unwrap();
        sim.register(HarvestPhase::new()).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();

        let mut pruned_any = false;
        for k in 0..20u64 {
            let report = sim.step().unwrap();
            pruned_any |= report.pruned > 0;
            assert_eq!(report.harvested.len(), 15, "step {} harvest size", k);
            assert!(report.harvested.iter().all(|e| e.step == Some(k)));
            assert_eq!(sim.log().collect(k).len(), 15);
        }
        assert!(pruned_any, "threshold was never crossed");
    }

    #[test]
    fn test_log_never_exceeds_threshold_plus_one_step() {
        let per_step = 30;
        let threshold = 50;
        let mut sim = counter_sim(bounded(threshold, 100));
        sim.register(chatter(per_step)).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();

        for _ in 0..25 {
            let report = sim.step().unwrap();
            assert!(
                report.log_len <= threshold + per_step,
                "log grew to {} at step {}",
                report.log_len,
                report.step
            );
        }
    }

    #[test]
    fn test_oversized_step_survives_prune() {
        let mut sim = counter_sim(bounded(10, 1));
        sim.register(chatter(25)).unwrap();
        sim.register(HarvestPhase::new()).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();

        for _ in 0..4 {
            let report = sim.step().unwrap();
            assert_eq!(report.harvested.len(), 25);
            assert_eq!(report.log_len, 25);
        }
    }

    // ========== Interaction Cache ==========

    #[test]
    fn test_cache_symmetric_and_pure_over_run() {
        let mut sim = reference_simulation(DemoWorld::default(), 5, EngineConfig::default()).unwrap();
        for _ in 0..12 {
            sim.step().unwrap();
            let codes: Vec<String> = sim.world().nations.iter().map(|n| n.code.clone()).collect();
            for a in &codes {
                for b in &codes {
                    assert_eq!(sim.cache().pairwise(a, b), sim.cache().pairwise(b, a));
                }
            }
        }
        let first = InteractionCache::from_world(sim.world());
        let second = InteractionCache::from_world(sim.world());
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_sees_mutations_made_between_steps() {
        let mut sim = reference_simulation(DemoWorld::default(), 5, EngineConfig::default()).unwrap();
        sim.step().unwrap();
        let usa = sim
            .world_mut()
            .nations
            .iter_mut()
            .find(|n| n.code == "usa")
            .unwrap();
        usa.power = 0.01;

        let report = sim.step().unwrap();
        assert_eq!(report.step, 1);
        assert_eq!(sim.cache().built_at(), Some(1));
        let cached = sim.cache().get("usa").unwrap().power;
        assert_eq!(cached, 0.01);
    }

    // ========== Aggregator ==========

    #[test]
    fn test_summaries_respect_interval() {
        let mut config = EngineConfig::default();
        config.aggregator.report_interval = 12;
        let mut sim = reference_simulation(DemoWorld::default(), 9, config).unwrap();
        let summary = sim.run(36, EventRetention::Summary).unwrap();

        let steps: Vec<u64> = summary.summaries.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![12, 24]);
        // windows are disjoint: the second starts after the first report
        assert_eq!(summary.summaries[0].window_start, 0);
        assert_eq!(summary.summaries[1].window_start, 13);
        let attacks = sim.aggregator().category_total("attacks");
        assert!(attacks > 0);
        // a summary within the interval is a no-op
        let mut agg = sim.aggregator().clone();
        assert!(agg.report_summary(30).is_none());
        assert_eq!(agg.category_total("attacks"), attacks);
    }

    // ========== Failures ==========

    fn failing_at(step: u64) -> impl epoch_engine::Phase<CounterWorld> + 'static {
        FnPhase::new("fragile", "Fragile", 15.0, move |_w: &mut CounterWorld, _r: &mut SimRng, ctx: &mut Ctx<'_>| {
            if ctx.step() == step {
                Err(PhaseError::failed("solver diverged"))
            } else {
                Ok(PhaseOutcome::empty())
            }
        })
    }

    fn flaky_factory(seed: u64) -> Result<Simulation<CounterWorld>, EngineError> {
        let mut sim = Simulation::new(CounterWorld::default(), seed, EngineConfig::default())?;
        sim.register(chatter(1))?;
        if seed % 2 == 1 {
            sim.register(failing_at(3))?;
        }
        sim.register(AdvanceTimePhase::new())?;
        Ok(sim)
    }

    #[test]
    fn test_phase_failure_carries_id_and_step() {
        let mut sim = counter_sim(EngineConfig::default());
        sim.register(failing_at(2)).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();
        let err = sim.run(10, EventRetention::Summary).unwrap_err();
        assert_eq!(err.phase_id(), Some("fragile"));
        assert_eq!(err.step(), Some(2));
        assert!(err.to_string().contains("solver diverged"));
    }

    #[test]
    fn test_batch_discards_failed_runs() {
        let config = BatchConfig { runs: 4, max_steps: 10, ..BatchConfig::default() };
        let report = run_batch(&config, &CancelToken::new(), flaky_factory).unwrap();
        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failures.len(), 2);
        let failed: Vec<u64> = report.failures.iter().map(|f| f.seed).collect();
        assert_eq!(failed, vec![1, 3]);
        assert!(report.failures.iter().all(|f| f.phase_id.as_deref() == Some("fragile") && f.step == Some(3)));
        assert_eq!(report.completion_rate(), 0.5);
        assert_eq!(report.step_stats().mean, 10.0);
    }

    #[test]
    fn test_batch_aborts_on_error_when_asked() {
        let config = BatchConfig { runs: 4, max_steps: 10, parallel: false, abort_on_error: true, ..BatchConfig::default() };
        let cancel = CancelToken::new();
        let err = run_batch(&config, &cancel, flaky_factory).unwrap_err();
        assert!(matches!(err, BatchError::Aborted { seed: 1, .. }));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_batch_launches_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = BatchConfig { runs: 3, ..BatchConfig::default() };
        let report = run_batch(&config, &cancel, flaky_factory).unwrap();
        assert!(report.completed.is_empty());
        assert_eq!(report.cancelled.len(), 3);
    }

    #[test]
    fn test_setup_error_is_fatal_to_batch() {
        let config = BatchConfig { runs: 2, parallel: false, ..BatchConfig::default() };
        let err = run_batch(&config, &CancelToken::new(), |seed| {
            let mut sim = flaky_factory(seed)?;
            sim.register(chatter(1))?;
            Ok(sim)
        })
        .unwrap_err();
        match err {
            BatchError::Setup { source: EngineError::DuplicatePhaseId { id }, .. } => assert_eq!(id, "chatter"),
            other => panic!("unexpected error {}", other),
        }
    }

    // ========== Configuration ==========

    #[test]
    fn test_json_config_drives_run() {
        let config = EngineConfig::from_json_str(
            r#"{ "log": { "prune_threshold": 5 }, "aggregator": { "report_interval": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.log.lookback_steps, 12);
        let mut sim = counter_sim(config);
        sim.register(chatter(2)).unwrap();
        sim.register(AdvanceTimePhase::new()).unwrap();
        for _ in 0..10 {
            assert!(sim.step().unwrap().log_len <= 5 + 2);
        }
    }
}
