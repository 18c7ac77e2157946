use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::CompletionClient;
use crate::conversation::Conversation;
use crate::events::{Event, EventKind, EventSink};
use crate::executor::{result_to_value, ToolError, ToolErrorKind, ToolExecutor, ToolResult};
use crate::gate::{ConfirmGate, GateDecision, SessionPolicy};
use crate::parser::{parse_response, ModelReply};
use crate::registry::ToolRegistry;
use crate::types::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Ok,
    TransportError,
    SafetyBlocked,
    ModelError,
    NoFinalAnswer,
    BudgetExhausted,
    Cancelled,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Ok => "ok",
            ExitReason::TransportError => "transport_error",
            ExitReason::SafetyBlocked => "safety_blocked",
            ExitReason::ModelError => "model_error",
            ExitReason::NoFinalAnswer => "no_final_answer",
            ExitReason::BudgetExhausted => "budget_exhausted",
            ExitReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub exit_reason: ExitReason,
    /// Final natural-language answer (or synthesized fallback) on success.
    pub final_output: String,
    pub error: Option<String>,
    pub tool_calls_made: u32,
}

/// Latched interrupt flag. Listening starts before the loop and the flag is
/// never cleared, so a Ctrl-C delivered mid-execution (when no suspension
/// point is awaiting it) is remembered and stops the run before the next
/// model request instead of being dropped.
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    pub fn listening() -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tx.send(true).ok();
            }
        });
        Self { rx }
    }

    #[cfg(test)]
    pub(crate) fn manual() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn raised(&self) -> bool {
        *self.rx.borrow()
    }

    async fn wait(&mut self) {
        if self.rx.wait_for(|raised| *raised).await.is_err() {
            // Listener task gone without raising; nothing to wait for.
            std::future::pending::<()>().await;
        }
    }
}

pub struct Agent {
    pub client: Box<dyn CompletionClient>,
    pub registry: ToolRegistry,
    pub executor: Box<dyn ToolExecutor>,
    pub gate: Box<dyn ConfirmGate>,
    pub system_instruction: String,
    pub max_iterations: u32,
    pub event_sink: Option<Box<dyn EventSink>>,
}

impl Agent {
    fn emit(&mut self, run_id: &str, step: u32, kind: EventKind, data: Value) {
        if let Some(sink) = self.event_sink.as_mut() {
            sink.emit(Event::new(run_id.to_string(), step, kind, data)).ok();
        }
    }

    fn finish(
        &mut self,
        run_id: String,
        step: u32,
        exit_reason: ExitReason,
        final_output: String,
        error: Option<String>,
        tool_calls_made: u32,
    ) -> RunOutcome {
        self.emit(
            &run_id,
            step,
            EventKind::RunEnd,
            json!({"exit_reason": exit_reason.as_str(), "tool_calls_made": tool_calls_made}),
        );
        RunOutcome {
            run_id,
            exit_reason,
            final_output,
            error,
            tool_calls_made,
        }
    }

    /// Drives one session: request, parse, confirm, execute, append, repeat.
    /// Strictly sequential; the only suspension points are the remote call
    /// and the confirmation read, both of which honor Ctrl-C.
    pub async fn run(&mut self, conversation: &mut Conversation) -> RunOutcome {
        self.run_with_interrupt(conversation, Interrupt::listening())
            .await
    }

    /// An interrupt never kills a tool mid-flight; it prevents the next step
    /// from starting. The flag is checked before every model request, so a
    /// signal that lands during execution still unwinds the run.
    pub(crate) async fn run_with_interrupt(
        &mut self,
        conversation: &mut Conversation,
        mut interrupt: Interrupt,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let declarations = self.registry.function_declarations();
        let mut policy = SessionPolicy::default();
        let mut tool_calls_made: u32 = 0;
        let mut last_exchange: Option<(String, ToolResult)> = None;
        self.emit(
            &run_id,
            0,
            EventKind::RunStart,
            json!({"max_iterations": self.max_iterations}),
        );

        loop {
            let step = tool_calls_made;
            if interrupt.raised() {
                return self.finish(
                    run_id,
                    step,
                    ExitReason::Cancelled,
                    String::new(),
                    Some("interrupted".to_string()),
                    tool_calls_made,
                );
            }
            if tool_calls_made >= self.max_iterations {
                let msg = format!("tool call limit reached ({})", self.max_iterations);
                return self.finish(
                    run_id,
                    step,
                    ExitReason::BudgetExhausted,
                    String::new(),
                    Some(msg),
                    tool_calls_made,
                );
            }

            self.emit(&run_id, step, EventKind::ModelRequestStart, json!({}));
            let sent = tokio::select! {
                r = self.client.generate(
                    conversation.snapshot(),
                    &declarations,
                    &self.system_instruction,
                ) => r,
                _ = interrupt.wait() => {
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::Cancelled,
                        String::new(),
                        Some("interrupted".to_string()),
                        tool_calls_made,
                    );
                }
            };
            let raw = match sent {
                Ok(v) => v,
                Err(e) => {
                    let msg = format!("{e:#}");
                    self.emit(&run_id, step, EventKind::Error, json!({"error": msg}));
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::TransportError,
                        String::new(),
                        Some(msg),
                        tool_calls_made,
                    );
                }
            };

            let reply = parse_response(&raw);
            self.emit(
                &run_id,
                step,
                EventKind::ModelResponseEnd,
                json!({"kind": reply_kind(&reply)}),
            );

            match reply {
                ModelReply::FunctionCall(call) => {
                    tool_calls_made += 1;
                    // Narration accompanies the call but never ends the run;
                    // it goes to the diagnostic stream before execution.
                    if let Some(comment) = &call.comment {
                        eprintln!("{comment}");
                    }
                    self.emit(
                        &run_id,
                        tool_calls_made,
                        EventKind::ToolCallDetected,
                        json!({"tool": call.name, "arguments": call.arguments}),
                    );
                    let result = match self.dispatch(&run_id, tool_calls_made, &call, &mut policy).await
                    {
                        Dispatch::Result(r) => r,
                        Dispatch::Interrupted => {
                            return self.finish(
                                run_id,
                                tool_calls_made,
                                ExitReason::Cancelled,
                                String::new(),
                                Some("interrupted".to_string()),
                                tool_calls_made,
                            );
                        }
                    };
                    let mut exec_data = json!({"tool": call.name, "ok": result.is_ok()});
                    if let Err(e) = &result {
                        exec_data["error"] = json!(e.message);
                        if let Some(code) = e.exit_code {
                            exec_data["exit_code"] = json!(code);
                        }
                    }
                    self.emit(&run_id, tool_calls_made, EventKind::ToolExecEnd, exec_data);
                    conversation.push_exchange(&call, result_to_value(&result));
                    last_exchange = Some((call.name.clone(), result));
                }
                ModelReply::Text(text) => {
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::Ok,
                        text,
                        None,
                        tool_calls_made,
                    );
                }
                ModelReply::NoResponse { diagnostic } => {
                    // Some backends omit the trailing narration after a tool
                    // result; degrade to a summary of the last result rather
                    // than failing the run.
                    if let Some((tool, result)) = &last_exchange {
                        let fallback = fallback_summary(tool, result);
                        return self.finish(
                            run_id,
                            step,
                            ExitReason::Ok,
                            fallback,
                            None,
                            tool_calls_made,
                        );
                    }
                    let msg = diagnostic.unwrap_or_else(|| "no response from the model".to_string());
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::NoFinalAnswer,
                        String::new(),
                        Some(msg),
                        tool_calls_made,
                    );
                }
                ModelReply::Blocked(msg) => {
                    self.emit(&run_id, step, EventKind::Error, json!({"error": msg}));
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::SafetyBlocked,
                        String::new(),
                        Some(msg),
                        tool_calls_made,
                    );
                }
                ModelReply::Error(msg) => {
                    self.emit(&run_id, step, EventKind::Error, json!({"error": msg}));
                    return self.finish(
                        run_id,
                        step,
                        ExitReason::ModelError,
                        String::new(),
                        Some(msg),
                        tool_calls_made,
                    );
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        run_id: &str,
        step: u32,
        call: &ToolCall,
        policy: &mut SessionPolicy,
    ) -> Dispatch {
        let Some(spec) = self.registry.lookup(&call.name) else {
            return Dispatch::Result(Err(ToolError::new(
                ToolErrorKind::UnknownTool,
                format!("unknown tool: {}", call.name),
            )));
        };
        let spec = spec.clone();
        if spec.requires_confirmation {
            let decision = self.gate.confirm(&spec, call, policy).await;
            self.emit(
                run_id,
                step,
                EventKind::ToolDecision,
                json!({"tool": call.name, "decision": decision_str(decision)}),
            );
            match decision {
                GateDecision::Approved => {}
                GateDecision::Denied => {
                    return Dispatch::Result(Err(ToolError::new(
                        ToolErrorKind::Cancelled,
                        "user declined the operation",
                    )));
                }
                GateDecision::Interrupted => return Dispatch::Interrupted,
            }
        }
        self.emit(
            run_id,
            step,
            EventKind::ToolExecStart,
            json!({"tool": call.name}),
        );
        Dispatch::Result(self.executor.execute(&spec, &call.arguments).await)
    }
}

enum Dispatch {
    Result(ToolResult),
    Interrupted,
}

fn decision_str(decision: GateDecision) -> &'static str {
    match decision {
        GateDecision::Approved => "allow",
        GateDecision::Denied => "deny",
        GateDecision::Interrupted => "interrupt",
    }
}

fn reply_kind(reply: &ModelReply) -> &'static str {
    match reply {
        ModelReply::FunctionCall(_) => "function_call",
        ModelReply::Text(_) => "text",
        ModelReply::NoResponse { .. } => "no_response",
        ModelReply::Blocked(_) => "blocked",
        ModelReply::Error(_) => "error",
    }
}

fn fallback_summary(tool: &str, result: &ToolResult) -> String {
    match result {
        Ok(value) => match value.get("result").and_then(|v| v.as_str()) {
            Some(text) if !text.is_empty() => format!("{tool} completed: {text}"),
            _ => format!("{tool} completed"),
        },
        Err(e) => format!("{tool} failed: {}", e.message),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use super::{Agent, ExitReason, Interrupt};
    use crate::client::CompletionClient;
    use crate::conversation::Conversation;
    use crate::executor::{ToolError, ToolErrorKind, ToolExecutor, ToolResult};
    use crate::gate::{ConfirmGate, GateDecision, SessionPolicy};
    use crate::registry::{ToolRegistry, ToolSpec, ToolsetKind};
    use crate::types::{Part, Role, ToolCall, Turn};

    struct ScriptedClient {
        responses: Mutex<VecDeque<Value>>,
        requests: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn generate(
            &self,
            _turns: &[Turn],
            _declarations: &Value,
            _system_instruction: &str,
        ) -> anyhow::Result<Value> {
            *self.requests.lock().expect("lock") += 1;
            match self.responses.lock().expect("lock").pop_front() {
                Some(v) => Ok(v),
                None => Err(anyhow::anyhow!("connection refused")),
            }
        }
    }

    struct ScriptedExecutor {
        results: Mutex<VecDeque<ToolResult>>,
        invocations: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ToolExecutor for ScriptedExecutor {
        async fn execute(&self, spec: &ToolSpec, _arguments: &Value) -> ToolResult {
            self.invocations
                .lock()
                .expect("lock")
                .push(spec.name.to_string());
            self.results
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"result": "ok"})))
        }
    }

    /// Mimics the interactive gate's policy fast path with scripted
    /// decisions instead of stdin.
    struct ScriptedGate {
        decisions: Mutex<VecDeque<GateDecision>>,
        always_on_first: bool,
        prompts: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl ConfirmGate for ScriptedGate {
        async fn confirm(
            &mut self,
            _spec: &ToolSpec,
            _call: &ToolCall,
            policy: &mut SessionPolicy,
        ) -> GateDecision {
            if policy.always_accept {
                return GateDecision::Approved;
            }
            *self.prompts.lock().expect("lock") += 1;
            if self.always_on_first {
                policy.always_accept = true;
                return GateDecision::Approved;
            }
            self.decisions
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(GateDecision::Approved)
        }
    }

    struct Harness {
        agent: Agent,
        requests: Arc<Mutex<u32>>,
        invocations: Arc<Mutex<Vec<String>>>,
        prompts: Arc<Mutex<u32>>,
    }

    fn harness(
        responses: Vec<Value>,
        results: Vec<ToolResult>,
        decisions: Vec<GateDecision>,
        always_on_first: bool,
        max_iterations: u32,
    ) -> Harness {
        let requests = Arc::new(Mutex::new(0));
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let prompts = Arc::new(Mutex::new(0));
        let agent = Agent {
            client: Box::new(ScriptedClient {
                responses: Mutex::new(responses.into()),
                requests: requests.clone(),
            }),
            registry: ToolRegistry::for_toolset(ToolsetKind::Filesystem),
            executor: Box::new(ScriptedExecutor {
                results: Mutex::new(results.into()),
                invocations: invocations.clone(),
            }),
            gate: Box::new(ScriptedGate {
                decisions: Mutex::new(decisions.into()),
                always_on_first,
                prompts: prompts.clone(),
            }),
            system_instruction: "test".to_string(),
            max_iterations,
            event_sink: None,
        };
        Harness {
            agent,
            requests,
            invocations,
            prompts,
        }
    }

    fn call_response(name: &str, args: Value) -> Value {
        json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": name, "args": args}}
                ]},
                "finishReason": "STOP"
            }]
        })
    }

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
    }

    fn function_result_value(turn: &Turn) -> &Value {
        match &turn.parts[0] {
            Part::FunctionResponse { function_response } => &function_response.response["content"],
            other => panic!("expected function response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_never_reaches_executor() {
        let mut h = harness(
            vec![
                call_response("bogus_tool", json!({})),
                text_response("that tool does not exist"),
            ],
            vec![],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("do something odd");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert_eq!(outcome.tool_calls_made, 1);
        assert!(h.invocations.lock().expect("lock").is_empty());
        let result = function_result_value(&conv.snapshot()[2]);
        assert!(result["error"]
            .as_str()
            .expect("error")
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn allow_always_prompts_once_for_three_deletes() {
        let responses = vec![
            call_response("delete_file", json!({"file_path": "a.tmp"})),
            call_response("delete_file", json!({"file_path": "b.tmp"})),
            call_response("delete_file", json!({"file_path": "c.tmp"})),
            text_response("Deleted 3 files."),
        ];
        let mut h = harness(responses, vec![], vec![], true, 10);
        let mut conv = Conversation::new();
        conv.push_user("delete all .tmp files");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert_eq!(*h.prompts.lock().expect("lock"), 1);
        assert_eq!(h.invocations.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn denial_short_circuits_without_executing() {
        let mut h = harness(
            vec![
                call_response("delete_file", json!({"file_path": "keep.txt"})),
                text_response("Okay, I left the file alone."),
            ],
            vec![],
            vec![GateDecision::Denied],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("delete keep.txt");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert!(h.invocations.lock().expect("lock").is_empty());
        let result = function_result_value(&conv.snapshot()[2]);
        assert_eq!(result["cancelled"], true);
    }

    #[tokio::test]
    async fn budget_exhausts_at_exact_limit_without_another_request() {
        let responses = vec![
            call_response("list_files", json!({})),
            call_response("list_files", json!({})),
            call_response("list_files", json!({})),
        ];
        let mut h = harness(responses, vec![], vec![], false, 2);
        let mut conv = Conversation::new();
        conv.push_user("keep listing");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::BudgetExhausted);
        assert_eq!(outcome.tool_calls_made, 2);
        assert_eq!(*h.requests.lock().expect("lock"), 2);
    }

    #[tokio::test]
    async fn no_response_after_tool_call_synthesizes_fallback() {
        let mut h = harness(
            vec![
                call_response("read_file", json!({"file_path": "a.txt"})),
                json!({"candidates": []}),
            ],
            vec![Ok(json!({"result": "hello world"}))],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("read a.txt");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert!(outcome.final_output.contains("read_file completed"));
        assert!(outcome.final_output.contains("hello world"));
    }

    #[tokio::test]
    async fn no_response_without_prior_call_fails() {
        let mut h = harness(vec![json!({"candidates": []})], vec![], vec![], false, 10);
        let mut conv = Conversation::new();
        conv.push_user("hello");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::NoFinalAnswer);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn missing_capability_folds_into_conversation_and_continues() {
        let mut h = harness(
            vec![
                call_response("read_file", json!({"file_path": "a.txt"})),
                text_response("The read tool is unavailable right now."),
            ],
            vec![Err(ToolError::new(
                ToolErrorKind::NotAvailable,
                "readfile.sh not found",
            ))],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("read a.txt");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        let result = function_result_value(&conv.snapshot()[2]);
        assert_eq!(result["error"], "readfile.sh not found");
    }

    #[tokio::test]
    async fn bulk_delete_continues_past_one_failure() {
        let responses = vec![
            call_response("delete_file", json!({"file_path": "a.tmp"})),
            call_response("delete_file", json!({"file_path": "b.tmp"})),
            call_response("delete_file", json!({"file_path": "c.tmp"})),
            text_response("Deleted 2 of 3 files; b.tmp was locked."),
        ];
        let results = vec![
            Ok(json!({"result": "deleted"})),
            Err(ToolError::new(ToolErrorKind::ExecutionFailed, "locked")),
            Ok(json!({"result": "deleted"})),
        ];
        let mut h = harness(responses, results, vec![], true, 10);
        let mut conv = Conversation::new();
        conv.push_user("delete all .tmp files");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert_eq!(h.invocations.lock().expect("lock").len(), 3);
        assert_eq!(outcome.final_output, "Deleted 2 of 3 files; b.tmp was locked.");
        let failed = function_result_value(&conv.snapshot()[4]);
        assert_eq!(failed["error"], "locked");
    }

    #[tokio::test]
    async fn transport_failure_terminates_the_run() {
        let mut h = harness(vec![], vec![], vec![], false, 10);
        let mut conv = Conversation::new();
        conv.push_user("hello");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::TransportError);
        assert!(outcome
            .error
            .as_deref()
            .expect("error")
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn safety_block_terminates_the_run() {
        let mut h = harness(
            vec![json!({"promptFeedback": {"blockReason": "SAFETY"}})],
            vec![],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("hello");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::SafetyBlocked);
    }

    /// Raises the interrupt flag from inside a tool execution, the window
    /// where no suspension point is awaiting the signal.
    struct FlaggingExecutor {
        tx: watch::Sender<bool>,
    }

    #[async_trait]
    impl ToolExecutor for FlaggingExecutor {
        async fn execute(&self, _spec: &ToolSpec, _arguments: &Value) -> ToolResult {
            self.tx.send(true).ok();
            Ok(json!({"result": "done"}))
        }
    }

    #[tokio::test]
    async fn interrupt_during_execution_stops_before_next_request() {
        let (tx, interrupt) = Interrupt::manual();
        let requests = Arc::new(Mutex::new(0));
        let mut agent = Agent {
            client: Box::new(ScriptedClient {
                responses: Mutex::new(
                    vec![
                        call_response("list_files", json!({})),
                        text_response("never reached"),
                    ]
                    .into(),
                ),
                requests: requests.clone(),
            }),
            registry: ToolRegistry::for_toolset(ToolsetKind::Filesystem),
            executor: Box::new(FlaggingExecutor { tx }),
            gate: Box::new(ScriptedGate {
                decisions: Mutex::new(VecDeque::new()),
                always_on_first: false,
                prompts: Arc::new(Mutex::new(0)),
            }),
            system_instruction: "test".to_string(),
            max_iterations: 10,
            event_sink: None,
        };
        let mut conv = Conversation::new();
        conv.push_user("list my files");
        let outcome = agent.run_with_interrupt(&mut conv, interrupt).await;
        assert_eq!(outcome.exit_reason, ExitReason::Cancelled);
        assert_eq!(*requests.lock().expect("lock"), 1);
        // The in-flight tool finished and its result was recorded; only the
        // next step was prevented.
        assert_eq!(conv.len(), 3);
    }

    #[tokio::test]
    async fn pre_raised_interrupt_never_contacts_the_model() {
        let (tx, interrupt) = Interrupt::manual();
        tx.send(true).expect("send");
        let mut h = harness(vec![text_response("hi")], vec![], vec![], false, 10);
        let mut conv = Conversation::new();
        conv.push_user("hello");
        let outcome = h.agent.run_with_interrupt(&mut conv, interrupt).await;
        assert_eq!(outcome.exit_reason, ExitReason::Cancelled);
        assert_eq!(*h.requests.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn early_stop_with_no_content_is_a_model_error() {
        let mut h = harness(
            vec![json!({
                "candidates": [{"content": {"parts": []}, "finishReason": "RECITATION"}]
            })],
            vec![],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("hello");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::ModelError);
        assert!(outcome
            .error
            .as_deref()
            .expect("error")
            .contains("RECITATION"));
    }

    #[tokio::test]
    async fn read_only_tools_bypass_the_gate() {
        let mut h = harness(
            vec![
                call_response("list_files", json!({"dir_path": "."})),
                text_response("2 files."),
            ],
            vec![Ok(json!({"result": "a.txt b.txt"}))],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("how many files are here");
        let outcome = h.agent.run(&mut conv).await;
        assert_eq!(outcome.exit_reason, ExitReason::Ok);
        assert_eq!(*h.prompts.lock().expect("lock"), 0);
        assert_eq!(h.invocations.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn call_and_result_pair_stays_ordered_in_context() {
        let mut h = harness(
            vec![
                call_response("read_file", json!({"file_path": "a.txt"})),
                text_response("done"),
            ],
            vec![Ok(json!({"result": "content"}))],
            vec![],
            false,
            10,
        );
        let mut conv = Conversation::new();
        conv.push_user("read a.txt");
        h.agent.run(&mut conv).await;
        let turns = conv.snapshot();
        assert_eq!(turns[1].role, Role::Model);
        assert!(matches!(turns[1].parts[0], Part::FunctionCall { .. }));
        assert_eq!(turns[2].role, Role::Function);
        assert!(matches!(turns[2].parts[0], Part::FunctionResponse { .. }));
    }
}
