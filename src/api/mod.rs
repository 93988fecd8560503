use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::core::{
    AllocationPoint, ContributionSolveConfig, ExpectationMode, FrontierPoint, Goal, GoalPlan,
    Inputs, Objective, PolicySimulation, RiskTolerance, SolveResult, plan_goals,
    price_series_stats, simulate_policy, solve, sweep_frontier,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliObjective {
    GoalProbability,
    LogUtility,
}

impl From<CliObjective> for Objective {
    fn from(value: CliObjective) -> Self {
        match value {
            CliObjective::GoalProbability => Objective::GoalProbability,
            CliObjective::LogUtility => Objective::LogUtility,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliExpectationMode {
    Analytic,
    MonteCarlo,
}

impl From<CliExpectationMode> for ExpectationMode {
    fn from(value: CliExpectationMode) -> Self {
        match value {
            CliExpectationMode::Analytic => ExpectationMode::Analytic,
            CliExpectationMode::MonteCarlo => ExpectationMode::MonteCarlo,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskTolerance {
    Low,
    Moderate,
    High,
}

impl From<CliRiskTolerance> for RiskTolerance {
    fn from(value: CliRiskTolerance) -> Self {
        match value {
            CliRiskTolerance::Low => RiskTolerance::Low,
            CliRiskTolerance::Moderate => RiskTolerance::Moderate,
            CliRiskTolerance::High => RiskTolerance::High,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiObjective {
    #[serde(alias = "goalProbability", alias = "goal_probability", alias = "probability")]
    GoalProbability,
    #[serde(alias = "logUtility", alias = "log_utility", alias = "utility")]
    LogUtility,
}

impl From<ApiObjective> for CliObjective {
    fn from(value: ApiObjective) -> Self {
        match value {
            ApiObjective::GoalProbability => CliObjective::GoalProbability,
            ApiObjective::LogUtility => CliObjective::LogUtility,
        }
    }
}

impl From<Objective> for ApiObjective {
    fn from(value: Objective) -> Self {
        match value {
            Objective::GoalProbability => ApiObjective::GoalProbability,
            Objective::LogUtility => ApiObjective::LogUtility,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiExpectationMode {
    Analytic,
    #[serde(alias = "monteCarlo", alias = "monte_carlo")]
    MonteCarlo,
}

impl From<ApiExpectationMode> for CliExpectationMode {
    fn from(value: ApiExpectationMode) -> Self {
        match value {
            ApiExpectationMode::Analytic => CliExpectationMode::Analytic,
            ApiExpectationMode::MonteCarlo => CliExpectationMode::MonteCarlo,
        }
    }
}

impl From<ExpectationMode> for ApiExpectationMode {
    fn from(value: ExpectationMode) -> Self {
        match value {
            ExpectationMode::Analytic => ApiExpectationMode::Analytic,
            ExpectationMode::MonteCarlo => ApiExpectationMode::MonteCarlo,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRiskTolerance {
    Low,
    Moderate,
    High,
}

impl From<ApiRiskTolerance> for CliRiskTolerance {
    fn from(value: ApiRiskTolerance) -> Self {
        match value {
            ApiRiskTolerance::Low => CliRiskTolerance::Low,
            ApiRiskTolerance::Moderate => CliRiskTolerance::Moderate,
            ApiRiskTolerance::High => CliRiskTolerance::High,
        }
    }
}

impl From<RiskTolerance> for ApiRiskTolerance {
    fn from(value: RiskTolerance) -> Self {
        match value {
            RiskTolerance::Low => ApiRiskTolerance::Low,
            RiskTolerance::Moderate => ApiRiskTolerance::Moderate,
            RiskTolerance::High => ApiRiskTolerance::High,
        }
    }
}

/// How a client entered its goal list; remembered per session so a
/// reload does not reset the form.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiInputMode {
    Manual,
    Imported,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiGoal {
    label: String,
    amount: f64,
    years: u32,
    priority: u32,
}

impl From<ApiGoal> for Goal {
    fn from(value: ApiGoal) -> Self {
        Goal {
            label: value.label,
            amount: value.amount,
            years: value.years,
            priority: value.priority,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RequestPayload {
    horizon_years: Option<u32>,
    horizon_months: Option<u32>,
    goal_amount: Option<f64>,
    initial_wealth: Option<f64>,
    wealth_max: Option<f64>,
    wealth_levels: Option<usize>,

    equity_return: Option<f64>,
    equity_volatility: Option<f64>,
    debt_return: Option<f64>,
    debt_volatility: Option<f64>,
    correlation: Option<f64>,

    monthly_contribution: Option<f64>,
    allocation_min: Option<f64>,
    allocation_max: Option<f64>,
    allocation_steps: Option<usize>,

    objective: Option<ApiObjective>,
    expectation_mode: Option<ApiExpectationMode>,
    transition_samples: Option<u32>,
    seed: Option<u64>,
    simulations: Option<u32>,
    include_value_table: Option<bool>,

    risk_tolerance: Option<ApiRiskTolerance>,
    target_success: Option<f64>,
    contribution_tolerance: Option<f64>,
    max_iterations: Option<u32>,
    monthly_capacity: Option<f64>,
    goals: Vec<ApiGoal>,
}

#[derive(Parser, Debug)]
#[command(
    name = "gbwm",
    about = "Goal-based wealth planner (dynamic-programming allocation solver over a wealth grid)"
)]
struct Cli {
    #[arg(long, default_value_t = 10, help = "Investment horizon in years")]
    horizon_years: u32,
    #[arg(long, help = "Horizon in months; overrides --horizon-years")]
    horizon_months: Option<u32>,
    #[arg(long, default_value_t = 200_000.0, help = "Target wealth at the horizon")]
    goal_amount: f64,
    #[arg(long, default_value_t = 100_000.0)]
    initial_wealth: f64,
    #[arg(long, help = "Top of the wealth grid; defaults to twice --goal-amount")]
    wealth_max: Option<f64>,
    #[arg(long, default_value_t = 100, help = "Number of discrete wealth levels")]
    wealth_levels: usize,
    #[arg(
        long,
        default_value_t = 12.0,
        help = "Expected annual equity return in percent"
    )]
    equity_return: f64,
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Annual equity volatility in percent"
    )]
    equity_volatility: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual debt return in percent"
    )]
    debt_return: f64,
    #[arg(long, default_value_t = 10.0, help = "Annual debt volatility in percent")]
    debt_volatility: f64,
    #[arg(
        long,
        default_value_t = 0.3,
        help = "Correlation between equity and debt returns"
    )]
    correlation: f64,
    #[arg(
        long,
        default_value_t = 1_000.0,
        help = "Cash added to the portfolio every month"
    )]
    monthly_contribution: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Lowest candidate equity fraction (0 to 1)"
    )]
    allocation_min: f64,
    #[arg(
        long,
        default_value_t = 1.0,
        help = "Highest candidate equity fraction (0 to 1)"
    )]
    allocation_max: f64,
    #[arg(
        long,
        default_value_t = 11,
        help = "Number of evenly spaced candidate allocations"
    )]
    allocation_steps: usize,
    #[arg(long, value_enum, default_value_t = CliObjective::GoalProbability)]
    objective: CliObjective,
    #[arg(
        long,
        value_enum,
        default_value_t = CliExpectationMode::Analytic,
        help = "Bellman expectation: closed-form lognormal buckets or seeded sampling"
    )]
    expectation_mode: CliExpectationMode,
    #[arg(
        long,
        default_value_t = 64,
        help = "Draws per grid cell in monte-carlo mode; 1 mirrors the legacy single draw"
    )]
    transition_samples: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(
        long,
        default_value_t = 1_000,
        help = "Forward validation scenarios replaying the solved policy; 0 disables"
    )]
    simulations: u32,
    #[arg(long, help = "Include the full value table in the output")]
    include_value_table: bool,
    #[arg(long, value_enum, default_value_t = CliRiskTolerance::Moderate)]
    risk_tolerance: CliRiskTolerance,
    #[arg(
        long,
        default_value_t = 90.0,
        help = "Required goal probability in percent when solving contributions"
    )]
    target_success: f64,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Bisection tolerance on the solved monthly contribution"
    )]
    contribution_tolerance: f64,
    #[arg(long, default_value_t = 32)]
    max_iterations: u32,
}

#[derive(Debug, Clone)]
struct ApiOptions {
    simulations: u32,
    include_value_table: bool,
    risk_tolerance: RiskTolerance,
    target_success: f64,
    contribution_tolerance: f64,
    max_iterations: u32,
    monthly_capacity: Option<f64>,
    goals: Vec<Goal>,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    objective: ApiObjective,
    expectation_mode: ApiExpectationMode,
    horizon_months: u32,
    goal_amount: f64,
    initial_wealth: f64,
    initial_wealth_index: usize,
    initial_value: f64,
    wealth_levels: Vec<f64>,
    allocations: Vec<f64>,
    policy: Vec<AllocationPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value_table: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation: Option<PolicySimulation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    target_success: f64,
    plan: GoalPlan,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrontierResponse {
    risk_tolerance: ApiRiskTolerance,
    points: Vec<FrontierPoint>,
    selected: FrontierPoint,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReturnsPayload {
    prices: Vec<f64>,
    years: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionState {
    input_mode: ApiInputMode,
    #[serde(default)]
    goals: Vec<ApiGoal>,
}

/// Per-client UI state, keyed by an opaque session id. Injected into
/// the router as shared state rather than living in a global.
#[derive(Debug, Default)]
struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    fn get(&self, id: &str) -> Option<SessionState> {
        self.sessions
            .lock()
            .expect("session store lock")
            .get(id)
            .cloned()
    }

    fn put(&self, id: String, state: SessionState) {
        self.sessions
            .lock()
            .expect("session store lock")
            .insert(id, state);
    }
}

fn build_inputs(cli: Cli) -> Result<Inputs, String> {
    let horizon_months = match cli.horizon_months {
        Some(months) => {
            if months < 1 {
                return Err("--horizon-months must be >= 1".to_string());
            }
            months
        }
        None => {
            if cli.horizon_years < 1 {
                return Err("--horizon-years must be >= 1".to_string());
            }
            cli.horizon_years * 12
        }
    };

    if !cli.goal_amount.is_finite() || cli.goal_amount <= 0.0 {
        return Err("--goal-amount must be > 0".to_string());
    }

    let wealth_max = cli.wealth_max.unwrap_or(2.0 * cli.goal_amount);
    if !wealth_max.is_finite() || wealth_max <= 0.0 {
        return Err("--wealth-max must be > 0".to_string());
    }
    if wealth_max < cli.goal_amount {
        return Err("--wealth-max must be >= --goal-amount".to_string());
    }

    if cli.wealth_levels < 2 {
        return Err("--wealth-levels must be >= 2".to_string());
    }

    if !cli.initial_wealth.is_finite()
        || cli.initial_wealth < 0.0
        || cli.initial_wealth > wealth_max
    {
        return Err("--initial-wealth must be between 0 and --wealth-max".to_string());
    }

    if !cli.monthly_contribution.is_finite() || cli.monthly_contribution < 0.0 {
        return Err("--monthly-contribution must be >= 0".to_string());
    }

    for (name, rate) in [
        ("--equity-return", cli.equity_return),
        ("--debt-return", cli.debt_return),
    ] {
        if !rate.is_finite() || !(-50.0..=100.0).contains(&rate) {
            return Err(format!("{name} must be between -50 and 100"));
        }
    }

    for (name, vol) in [
        ("--equity-volatility", cli.equity_volatility),
        ("--debt-volatility", cli.debt_volatility),
    ] {
        if !vol.is_finite() || !(0.0..=100.0).contains(&vol) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if !(-1.0..=1.0).contains(&cli.correlation) {
        return Err("--correlation must be between -1 and 1".to_string());
    }

    if !(0.0..=1.0).contains(&cli.allocation_min) || !(0.0..=1.0).contains(&cli.allocation_max) {
        return Err("--allocation-min and --allocation-max must be between 0 and 1".to_string());
    }
    if cli.allocation_min > cli.allocation_max {
        return Err("--allocation-min must be <= --allocation-max".to_string());
    }
    if cli.allocation_steps < 1 {
        return Err("--allocation-steps must be >= 1".to_string());
    }
    if cli.transition_samples < 1 {
        return Err("--transition-samples must be >= 1".to_string());
    }

    let months_per_year = 12.0_f64;
    Ok(Inputs {
        horizon_months,
        goal_amount: cli.goal_amount,
        initial_wealth: cli.initial_wealth,
        wealth_max,
        wealth_levels: cli.wealth_levels,
        equity_mean: cli.equity_return / 100.0 / months_per_year,
        equity_vol: cli.equity_volatility / 100.0 / months_per_year.sqrt(),
        debt_mean: cli.debt_return / 100.0 / months_per_year,
        debt_vol: cli.debt_volatility / 100.0 / months_per_year.sqrt(),
        correlation: cli.correlation,
        monthly_contribution: cli.monthly_contribution,
        allocation_min: cli.allocation_min,
        allocation_max: cli.allocation_max,
        allocation_steps: cli.allocation_steps,
        objective: cli.objective.into(),
        expectation: cli.expectation_mode.into(),
        transition_samples: cli.transition_samples,
        seed: cli.seed,
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let store = Arc::new(SessionStore::default());
    let app = Router::new()
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .route("/api/plan", post(plan_post_handler))
        .route(
            "/api/frontier",
            get(frontier_get_handler).post(frontier_post_handler),
        )
        .route("/api/returns", post(returns_post_handler))
        .route(
            "/api/session/:id",
            get(session_get_handler).put(session_put_handler),
        )
        .fallback(not_found_handler)
        .with_state(store);

    let listener = TcpListener::bind(addr).await?;
    println!("GBWM HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/solve");

    axum::serve(listener, app).await
}

/// Runs one solve from command-line flags and prints the JSON result,
/// the same shape `/api/solve` returns.
pub fn run_cli_solve(args: &[String]) -> Result<(), String> {
    let mut argv = vec!["gbwm".to_string()];
    argv.extend(args.iter().cloned());
    let cli = Cli::try_parse_from(argv).map_err(|e| e.to_string())?;

    let simulations = cli.simulations;
    let include_value_table = cli.include_value_table;
    let inputs = build_inputs(cli)?;
    let solved = solve(&inputs)?;
    let simulation = if simulations > 0 {
        Some(simulate_policy(&inputs, &solved, simulations)?)
    } else {
        None
    };

    let response = build_solve_response(&inputs, solved, simulation, include_value_table);
    let rendered = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("Failed to render result: {e}"))?;
    println!("{rendered}");
    Ok(())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn solve_get_handler(Query(payload): Query<RequestPayload>) -> Response {
    solve_handler_impl(payload)
}

async fn solve_post_handler(Json(payload): Json<RequestPayload>) -> Response {
    solve_handler_impl(payload)
}

fn solve_handler_impl(payload: RequestPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let solved = match solve(&request.inputs) {
        Ok(solved) => solved,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let simulation = if request.options.simulations > 0 {
        match simulate_policy(&request.inputs, &solved, request.options.simulations) {
            Ok(simulation) => Some(simulation),
            Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
        }
    } else {
        None
    };

    let response = build_solve_response(
        &request.inputs,
        solved,
        simulation,
        request.options.include_value_table,
    );
    json_response(StatusCode::OK, response)
}

async fn plan_post_handler(Json(payload): Json<RequestPayload>) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let Some(capacity) = request.options.monthly_capacity else {
        return error_response(StatusCode::BAD_REQUEST, "monthlyCapacity is required");
    };

    let config = ContributionSolveConfig {
        target_success: request.options.target_success,
        search_min: 0.0,
        search_max: capacity,
        tolerance: request.options.contribution_tolerance,
        max_iterations: request.options.max_iterations,
    };

    match plan_goals(&request.inputs, config, capacity, &request.options.goals) {
        Ok(plan) => json_response(
            StatusCode::OK,
            PlanResponse {
                target_success: request.options.target_success,
                plan,
            },
        ),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn frontier_get_handler(Query(payload): Query<RequestPayload>) -> Response {
    frontier_handler_impl(payload)
}

async fn frontier_post_handler(Json(payload): Json<RequestPayload>) -> Response {
    frontier_handler_impl(payload)
}

fn frontier_handler_impl(payload: RequestPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match sweep_frontier(&request.inputs, request.options.risk_tolerance) {
        Ok(sweep) => json_response(
            StatusCode::OK,
            FrontierResponse {
                risk_tolerance: request.options.risk_tolerance.into(),
                points: sweep.points,
                selected: sweep.selected,
            },
        ),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn returns_post_handler(Json(payload): Json<ReturnsPayload>) -> Response {
    match price_series_stats(&payload.prices, payload.years) {
        Ok(stats) => json_response(StatusCode::OK, stats),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn session_get_handler(
    State(store): State<Arc<SessionStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.get(&id) {
        Some(state) => json_response(StatusCode::OK, state),
        None => error_response(StatusCode::NOT_FOUND, "session not found"),
    }
}

async fn session_put_handler(
    State(store): State<Arc<SessionStore>>,
    Path(id): Path<String>,
    Json(state): Json<SessionState>,
) -> Response {
    if state.goals.len() > 10 {
        return error_response(StatusCode::BAD_REQUEST, "goals must contain at most 10 entries");
    }
    store.put(id, state.clone());
    json_response(StatusCode::OK, state)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<RequestPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: RequestPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.horizon_years {
        cli.horizon_years = v;
    }
    if let Some(v) = payload.horizon_months {
        cli.horizon_months = Some(v);
    }
    if let Some(v) = payload.goal_amount {
        cli.goal_amount = v;
    }
    if let Some(v) = payload.initial_wealth {
        cli.initial_wealth = v;
    }
    if let Some(v) = payload.wealth_max {
        cli.wealth_max = Some(v);
    }
    if let Some(v) = payload.wealth_levels {
        cli.wealth_levels = v;
    }

    if let Some(v) = payload.equity_return {
        cli.equity_return = v;
    }
    if let Some(v) = payload.equity_volatility {
        cli.equity_volatility = v;
    }
    if let Some(v) = payload.debt_return {
        cli.debt_return = v;
    }
    if let Some(v) = payload.debt_volatility {
        cli.debt_volatility = v;
    }
    if let Some(v) = payload.correlation {
        cli.correlation = v;
    }

    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.allocation_min {
        cli.allocation_min = v;
    }
    if let Some(v) = payload.allocation_max {
        cli.allocation_max = v;
    }
    if let Some(v) = payload.allocation_steps {
        cli.allocation_steps = v;
    }

    if let Some(v) = payload.objective {
        cli.objective = v.into();
    }
    if let Some(v) = payload.expectation_mode {
        cli.expectation_mode = v.into();
    }
    if let Some(v) = payload.transition_samples {
        cli.transition_samples = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.include_value_table {
        cli.include_value_table = v;
    }

    if let Some(v) = payload.risk_tolerance {
        cli.risk_tolerance = v.into();
    }
    if let Some(v) = payload.target_success {
        cli.target_success = v;
    }
    if let Some(v) = payload.contribution_tolerance {
        cli.contribution_tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.max_iterations = v;
    }

    if !(0.0..=100.0).contains(&cli.target_success) {
        return Err("targetSuccess must be between 0 and 100".to_string());
    }
    if !cli.contribution_tolerance.is_finite() || cli.contribution_tolerance <= 0.0 {
        return Err("contributionTolerance must be > 0".to_string());
    }
    if cli.max_iterations == 0 {
        return Err("maxIterations must be > 0".to_string());
    }
    if let Some(capacity) = payload.monthly_capacity {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err("monthlyCapacity must be > 0".to_string());
        }
    }
    if payload.goals.len() > 10 {
        return Err("goals must contain at most 10 entries".to_string());
    }

    let options = ApiOptions {
        simulations: cli.simulations,
        include_value_table: cli.include_value_table,
        risk_tolerance: cli.risk_tolerance.into(),
        target_success: cli.target_success / 100.0,
        contribution_tolerance: cli.contribution_tolerance,
        max_iterations: cli.max_iterations,
        monthly_capacity: payload.monthly_capacity,
        goals: payload.goals.into_iter().map(Goal::from).collect(),
    };

    let inputs = build_inputs(cli)?;
    Ok(ApiRequest { inputs, options })
}

fn default_cli_for_api() -> Cli {
    Cli {
        horizon_years: 10,
        horizon_months: None,
        goal_amount: 200_000.0,
        initial_wealth: 100_000.0,
        wealth_max: None,
        wealth_levels: 100,
        equity_return: 12.0,
        equity_volatility: 20.0,
        debt_return: 7.0,
        debt_volatility: 10.0,
        correlation: 0.3,
        monthly_contribution: 1_000.0,
        allocation_min: 0.0,
        allocation_max: 1.0,
        allocation_steps: 11,
        objective: CliObjective::GoalProbability,
        expectation_mode: CliExpectationMode::Analytic,
        transition_samples: 64,
        seed: 42,
        simulations: 1_000,
        include_value_table: false,
        risk_tolerance: CliRiskTolerance::Moderate,
        target_success: 90.0,
        contribution_tolerance: 100.0,
        max_iterations: 32,
    }
}

fn build_solve_response(
    inputs: &Inputs,
    solved: SolveResult,
    simulation: Option<PolicySimulation>,
    include_value_table: bool,
) -> SolveResponse {
    let policy = solved.allocation_report();
    SolveResponse {
        objective: inputs.objective.into(),
        expectation_mode: inputs.expectation.into(),
        horizon_months: inputs.horizon_months,
        goal_amount: inputs.goal_amount,
        initial_wealth: inputs.initial_wealth,
        initial_wealth_index: solved.initial_wealth_index,
        initial_value: solved.initial_value,
        wealth_levels: solved.wealth_levels,
        allocations: solved.allocations,
        policy,
        value_table: include_value_table.then_some(solved.value),
        simulation,
    }
}
