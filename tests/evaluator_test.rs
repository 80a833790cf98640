use distcalc::error::CalcError;
use distcalc::runtime::{Calculator, ExecTimeConfig, SharedExecTimes};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn calculator(pool_size: usize, timings: ExecTimeConfig) -> Calculator {
    Calculator::new(pool_size, SharedExecTimes::new(timings))
}

fn oracle(expression: &str) -> f64 {
    match evalexpr::eval(expression).unwrap() {
        evalexpr::Value::Float(f) => f,
        evalexpr::Value::Int(i) => i as f64,
        other => panic!("unexpected oracle value {:?}", other),
    }
}

/// Highest number of operations between their start and end log lines.
fn max_concurrency(log: &str) -> usize {
    let mut current = 0usize;
    let mut max = 0usize;
    for line in log.lines() {
        if line.starts_with("Start worker") {
            current += 1;
            max = max.max(current);
        } else if line.starts_with("End worker") || line.starts_with("Worker ") {
            current -= 1;
        }
    }
    max
}

#[tokio::test]
async fn test_matches_infix_oracle() {
    let calc = calculator(3, ExecTimeConfig::default());
    let expressions = [
        "3.0 + 4.0 * 2.0 / (1.0 - 5.0)",
        "1.0 - 2.0 - 3.0",
        "1.0 - 2.0 + 3.0",
        "8.0 / 4.0 / 2.0",
        "8.0 / 4.0 * 2.0",
        "2.0 * 3.0 * 4.0 / 6.0",
        "1.0 - -1.0",
        "2.0 * (-1.0)",
        "(1.5 + 2.5) * (3.0 - 7.0) / 2.0 - 10.0",
        "100.0 - 5.0 * 3.0 + 2.0 / 4.0 - 1.0",
        "-(2.0 + 3.0) * 4.0",
        "((2.0))",
    ];

    for expression in expressions {
        let got = calc.calculate_expression(expression).await.unwrap().answer;
        let want = oracle(expression);
        assert!((got - want).abs() < 1e-9, "{}: got {}, want {}", expression, got, want);
    }
}

#[tokio::test]
async fn test_documented_examples() {
    let calc = calculator(2, ExecTimeConfig::default());

    assert_eq!(calc.calculate_expression("2 * (-1)").await.unwrap().answer, -2.0);
    assert!(matches!(calc.calculate_expression("1 + ()").await, Err(CalcError::Parse { .. })));
    assert!(matches!(calc.calculate_expression("2 2 - 2").await, Err(CalcError::Parse { .. })));
    assert_eq!(calc.calculate_expression("7").await.unwrap().answer, 7.0);
}

#[tokio::test]
async fn test_log_lines() {
    let calc = calculator(2, ExecTimeConfig::default());
    let calculation = calc.calculate_expression("3 + 4").await.unwrap();
    let lines: Vec<&str> = calculation.log.lines().collect();

    assert_eq!(
        lines,
        vec![
            "Start conversion to reversed polish notation",
            "Result: 3 4 +",
            "Start of calculations",
            "Start worker 2; work: 3 + 4",
            "End worker 2; work: 3 + 4; result: 7",
            "All workers are stopped; the final result is 7",
        ]
    );
}

#[tokio::test]
async fn test_division_by_zero_aborts() {
    let calc = calculator(2, ExecTimeConfig::default());
    let err = calc.calculate_expression("1/0").await.unwrap_err();
    assert_eq!(err, CalcError::DivisionByZero { index: 2 });

    let err = calc.calculate_expression("(5 - 5) * 3 + 2 / (1 - 1)").await.unwrap_err();
    assert!(matches!(err, CalcError::DivisionByZero { .. }));
}

#[tokio::test]
async fn test_zero_pool_size_fails_before_work() {
    let calc = calculator(0, ExecTimeConfig::default());
    let log = distcalc::runtime::ExpressionLog::new();
    let err = calc.calculate_with_log("1 + 2", &log).await.unwrap_err();

    assert!(matches!(err, CalcError::Config(_)));
    assert!(!log.text().await.contains("Start worker"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bound_is_respected() {
    // 1. Six independent multiplications, pool of two
    let calc = calculator(2, ExecTimeConfig::from_millis(0, 0, 40, 0));
    let expression = "1*1 + 2*2 + 3*3 + 4*4 + 5*5 + 6*6";

    // 2. Sample the running gauge while evaluating
    let peak = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));
    let sampler = {
        let calc = calc.clone();
        let peak = peak.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                peak.fetch_max(calc.running_workers(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let calculation = calc.calculate_expression(expression).await.unwrap();
    stop.store(true, Ordering::SeqCst);
    sampler.await.unwrap();

    // 3. Verify
    assert_eq!(calculation.answer, 91.0);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(max_concurrency(&calculation.log) <= 2);
    assert_eq!(calc.running_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_operations_run_in_parallel() {
    let timings = ExecTimeConfig::from_millis(0, 0, 100, 0);
    let expression = "1*1 + 2*2 + 3*3 + 4*4";

    let start = Instant::now();
    let parallel = calculator(4, timings).calculate_expression(expression).await.unwrap();
    let parallel_time = start.elapsed();

    let start = Instant::now();
    let serial = calculator(1, timings).calculate_expression(expression).await.unwrap();
    let serial_time = start.elapsed();

    assert_eq!(parallel.answer, 30.0);
    assert_eq!(serial.answer, 30.0);
    assert!(parallel_time < Duration::from_millis(300), "parallel took {:?}", parallel_time);
    assert!(serial_time >= Duration::from_millis(400), "serial took {:?}", serial_time);
    assert_eq!(max_concurrency(&serial.log), 1);
}

#[tokio::test]
async fn test_timing_updates_apply_to_later_operations() {
    let times = SharedExecTimes::new(ExecTimeConfig::default());
    let calc = Calculator::new(2, times.clone());

    let mut update = distcalc::runtime::TimingMap::new();
    update.insert("+".to_string(), 120);
    times.apply(&update).await.unwrap();

    let start = Instant::now();
    calc.calculate_expression("1 + 1").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(120));
}
