use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use vlm_chat_test_model::{PresetResponse, TestModelService};

use crate::attachment::tests::png_attachment;
use crate::{
    ChatConfig, ChatStatus, Conversation, ImageAttachment, Orchestrator,
    OrchestratorBuilder, Role, copy,
};

fn build(service: TestModelService) -> Orchestrator {
    OrchestratorBuilder::with_model_service(service)
        .with_config(ChatConfig::builder().with_model_id("test/model").build())
        .build()
}

async fn wait_for(
    orchestrator: &Orchestrator,
    f: impl FnMut(&Conversation) -> bool,
) -> Conversation {
    let mut rx = orchestrator.subscribe();
    let conversation = timeout(Duration::from_secs(60), rx.wait_for(f))
        .await
        .unwrap()
        .unwrap()
        .clone();
    conversation
}

async fn build_ready(service: TestModelService) -> Orchestrator {
    let orchestrator = build(service);
    wait_for(&orchestrator, Conversation::is_model_ready).await;
    orchestrator
}

/// Waits until every queued intent has been applied and no turn is in
/// flight.
async fn settle(orchestrator: &Orchestrator) -> Conversation {
    orchestrator.snapshot().await;
    wait_for(orchestrator, |conv| !conv.is_loading()).await
}

#[tokio::test(start_paused = true)]
async fn test_simple_turn() {
    let service = TestModelService::with_script([PresetResponse::answer(
        "Hi, what can I do for you?",
    )]);
    let orchestrator = build(service.clone());
    assert!(orchestrator.current().status().is_loading());

    let conversation =
        wait_for(&orchestrator, Conversation::is_model_ready).await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::MODEL_READY_TO_CHAT.to_owned())
    );
    assert_eq!(service.loaded_models(), vec!["test/model".to_owned()]);

    orchestrator.send("  Hello\n");
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.is_loading());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Loading(copy::GENERATING_RESPONSE.to_owned())
    );

    let conversation = settle(&orchestrator).await;
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[0].text(), "Hello");
    assert!(messages[0].image().is_none());
    assert_eq!(messages[1].role(), Role::Assistant);
    assert_eq!(messages[1].text(), "Hi, what can I do for you?");
    assert!(!messages[1].is_streaming());
    assert!(conversation.has_started());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::ready_for_next_message(false).to_owned())
    );

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "Hello");
    assert!(requests[0].image.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_follow_up() {
    let service = TestModelService::with_script([
        PresetResponse::answer("One."),
        PresetResponse::answer("Two."),
        PresetResponse::answer("Three."),
    ]);
    let orchestrator = build_ready(service).await;

    // Nothing has been answered yet, so this starts the conversation.
    orchestrator.send_follow_up("first");
    let conversation = settle(&orchestrator).await;
    assert_eq!(
        conversation.status().message(),
        copy::ready_for_next_message(false)
    );

    orchestrator.send("second");
    let conversation = settle(&orchestrator).await;
    assert_eq!(
        conversation.status().message(),
        copy::ready_for_next_message(true)
    );

    orchestrator.start_conversation("third");
    let conversation = settle(&orchestrator).await;
    assert_eq!(
        conversation.status().message(),
        copy::ready_for_next_message(false)
    );
    let texts: Vec<_> = conversation
        .messages()
        .iter()
        .map(|msg| msg.text().to_owned())
        .collect();
    assert_eq!(
        texts,
        ["first", "One.", "second", "Two.", "third", "Three."]
    );
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_prompt_is_ignored() {
    let service = TestModelService::with_script(Vec::new());
    let orchestrator = build_ready(service.clone()).await;
    let before = orchestrator.snapshot().await;

    orchestrator.send("   \n\t ");
    orchestrator.start_conversation("");
    let after = orchestrator.snapshot().await;

    assert!(after.messages().is_empty());
    assert_eq!(after.status(), before.status());
    assert!(!after.is_loading());
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_while_in_flight_is_ignored() {
    let service = TestModelService::with_script([
        PresetResponse::answer("First answer."),
        PresetResponse::answer("Never asked."),
    ]);
    let orchestrator = build_ready(service.clone()).await;

    orchestrator.send("first");
    let conversation = orchestrator.snapshot().await;
    assert_eq!(conversation.messages().len(), 2);

    orchestrator.send("second");
    let conversation = orchestrator.snapshot().await;
    assert_eq!(conversation.messages().len(), 2);
    assert!(conversation.last_message().unwrap().is_streaming());

    let conversation = settle(&orchestrator).await;
    assert_eq!(conversation.messages().len(), 2);
    assert_eq!(conversation.messages()[1].text(), "First answer.");
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_idle_is_ignored() {
    let service = TestModelService::with_script(Vec::new());
    let orchestrator = build_ready(service).await;
    let before = orchestrator.snapshot().await;

    orchestrator.cancel();
    let after = orchestrator.snapshot().await;

    assert_eq!(after.status(), before.status());
    assert_eq!(after.messages().len(), before.messages().len());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure() {
    let service = TestModelService::with_script([PresetResponse::answer(
        "Never asked.",
    )])
    .fail_load("weights missing");
    let orchestrator = build(service.clone());

    let conversation =
        wait_for(&orchestrator, |conv| conv.status().is_error()).await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Error(copy::MODEL_LOAD_FAILED.to_owned())
    );
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].role(), Role::System);
    assert_eq!(conversation.messages()[0].text(), copy::MODEL_LOAD_FAILED);
    assert!(!conversation.is_model_ready());

    orchestrator.send("hello?");
    let conversation = orchestrator.snapshot().await;
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(
        conversation.status(),
        &ChatStatus::Error(copy::MODEL_LOAD_FAILED.to_owned())
    );
    assert!(!conversation.is_loading());
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_while_model_loading() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Ready now.")])
            .with_load_delay(Duration::from_secs(5));
    let orchestrator = build(service.clone());

    orchestrator.send("too early");
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.messages().is_empty());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Error(copy::MODEL_SESSION_NOT_READY.to_owned())
    );

    let conversation =
        wait_for(&orchestrator, Conversation::is_model_ready).await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::MODEL_READY_TO_CHAT.to_owned())
    );

    orchestrator.send("now");
    let conversation = settle(&orchestrator).await;
    assert_eq!(conversation.last_message().unwrap().text(), "Ready now.");
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_image_turn() {
    let service = TestModelService::with_script([PresetResponse::answer(
        "A red circle.",
    )]);
    let orchestrator = build_ready(service.clone()).await;

    let image = png_attachment(2, 2);
    orchestrator.attach_image(image.clone());
    let conversation = orchestrator.snapshot().await;
    assert_eq!(conversation.attached_image(), Some(&image));
    assert_eq!(
        conversation.status(),
        &ChatStatus::NeedsImage(
            copy::IMAGE_ATTACHED_AWAITING_MESSAGE.to_owned()
        )
    );

    orchestrator.send("describe this");
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.attached_image().is_none());

    let conversation = settle(&orchestrator).await;
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[0].text(), "describe this");
    assert_eq!(messages[0].image(), Some(&image));
    assert_eq!(messages[1].role(), Role::Assistant);
    assert_eq!(messages[1].text(), "A red circle.");
    assert!(!messages[1].is_streaming());
    assert!(conversation.attached_image().is_none());
    assert!(conversation.has_started());

    let requests = service.requests();
    let model_image = requests[0].image.as_ref().unwrap();
    assert_eq!((model_image.width(), model_image.height()), (2, 2));
}

#[tokio::test(start_paused = true)]
async fn test_image_conversion_failure() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Never asked.")]);
    let orchestrator = build_ready(service.clone()).await;

    orchestrator.attach_image(ImageAttachment::new(&b"not an image"[..]));
    orchestrator.send("what is this?");
    let conversation = settle(&orchestrator).await;

    let messages = conversation.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role(), Role::System);
    assert_eq!(messages[0].text(), copy::IMAGE_CONVERSION_FAILED);
    assert!(conversation.attached_image().is_none());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Error(copy::IMAGE_FAILED_TO_LOAD.to_owned())
    );
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_converting_image() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Never asked.")]);
    let orchestrator = build_ready(service.clone()).await;

    let image = png_attachment(1024, 768);
    orchestrator.attach_image(image.clone());
    orchestrator.send("describe this");
    orchestrator.cancel();

    // The image is decoded off the orchestrator, so both the cancel and
    // the snapshot are applied before the decoding ends.
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.is_loading());
    assert!(conversation.messages().is_empty());
    assert!(conversation.attached_image().is_none());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::GENERATION_CANCELLED.to_owned())
    );

    let conversation = settle(&orchestrator).await;
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::User);
    assert_eq!(messages[0].text(), "describe this");
    assert_eq!(messages[0].image(), Some(&image));
    assert_eq!(messages[1].role(), Role::Assistant);
    assert_eq!(messages[1].text(), copy::GENERATION_CANCELLED);
    assert!(!messages[1].is_streaming());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::GENERATION_CANCELLED.to_owned())
    );
    assert!(!conversation.has_started());
    assert!(service.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_answer() {
    let service = TestModelService::with_script([
        PresetResponse::answer("Discarded."),
        PresetResponse::answer("Answered."),
    ])
    .with_respond_delay(Duration::from_secs(10));
    let orchestrator = build_ready(service.clone()).await;

    orchestrator.send("hello");
    orchestrator.cancel();
    let conversation = orchestrator.snapshot().await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::GENERATION_CANCELLED.to_owned())
    );

    let conversation = settle(&orchestrator).await;
    let placeholder = conversation.last_message().unwrap();
    assert_eq!(placeholder.role(), Role::Assistant);
    assert_eq!(placeholder.text(), copy::GENERATION_CANCELLED);
    assert!(!placeholder.is_streaming());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::GENERATION_CANCELLED.to_owned())
    );
    assert!(!conversation.is_loading());
    assert!(!conversation.has_started());

    // The in-flight handle has been released, so a new turn can start.
    orchestrator.send("hello again");
    let conversation = settle(&orchestrator).await;
    assert_eq!(conversation.messages().len(), 4);
    assert_eq!(conversation.last_message().unwrap().text(), "Answered.");
    assert_eq!(service.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_reveal() {
    let answer = "This answer is long enough to be cancelled halfway.";
    let service =
        TestModelService::with_script([PresetResponse::answer(answer)]);
    let orchestrator = build_ready(service).await;

    orchestrator.send("talk to me");
    let conversation = wait_for(&orchestrator, |conv| {
        conv.streaming_message()
            .is_some_and(|msg| msg.text().len() >= 4)
    })
    .await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Loading(copy::STREAMING_RESPONSE.to_owned())
    );

    orchestrator.cancel();
    let conversation = settle(&orchestrator).await;
    let msg = conversation.last_message().unwrap();
    assert!(!msg.is_streaming());
    assert!(msg.text().len() >= 4);
    assert!(msg.text().len() < answer.len());
    assert!(answer.starts_with(msg.text()));
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::GENERATION_CANCELLED.to_owned())
    );
}

#[tokio::test(start_paused = true)]
async fn test_inference_failure() {
    let service = TestModelService::with_script([
        PresetResponse::failure("out of memory"),
        PresetResponse::answer("Better now."),
    ]);
    let orchestrator = build_ready(service).await;

    orchestrator.send("hello");
    let conversation = settle(&orchestrator).await;
    let placeholder = conversation.last_message().unwrap();
    assert_eq!(placeholder.text(), copy::STREAMED_ERROR);
    assert!(!placeholder.is_streaming());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Error(copy::SEND_TO_TRY_AGAIN.to_owned())
    );
    assert!(!conversation.has_started());

    orchestrator.send("hello");
    let conversation = settle(&orchestrator).await;
    assert_eq!(conversation.last_message().unwrap().text(), "Better now.");
    assert!(conversation.has_started());
}

#[tokio::test(start_paused = true)]
async fn test_attachment_status() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Sure.")])
            .with_load_delay(Duration::from_secs(1));
    let orchestrator = build(service);

    // The status is left alone until the model is ready.
    orchestrator.attach_image(png_attachment(1, 1));
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.attached_image().is_some());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Loading(copy::LOADING_MODEL.to_owned())
    );

    wait_for(&orchestrator, Conversation::is_model_ready).await;
    orchestrator.remove_image();
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.attached_image().is_none());
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::MODEL_READY_TO_CHAT.to_owned())
    );

    orchestrator.send("hi");
    settle(&orchestrator).await;

    orchestrator.attach_image(png_attachment(1, 1));
    orchestrator.remove_image();
    let conversation = orchestrator.snapshot().await;
    assert_eq!(
        conversation.status(),
        &ChatStatus::Ready(copy::IMAGE_CLEARED_KEEP_CHATTING.to_owned())
    );
}

#[tokio::test(start_paused = true)]
async fn test_attach_while_in_flight_is_ignored() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Done.")]);
    let orchestrator = build_ready(service).await;

    orchestrator.send("hi");
    orchestrator.attach_image(png_attachment(1, 1));
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.attached_image().is_none());

    let conversation = settle(&orchestrator).await;
    assert!(conversation.attached_image().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_streaming_message() {
    let service = TestModelService::with_script([
        PresetResponse::answer("First answer."),
        PresetResponse::failure("boom"),
        PresetResponse::answer("Third answer."),
    ]);
    let orchestrator = build_ready(service).await;

    let mut rx = orchestrator.subscribe();
    let monitor = tokio::spawn(async move {
        let mut max_streaming = 0;
        while rx.changed().await.is_ok() {
            let streaming = rx
                .borrow_and_update()
                .messages()
                .iter()
                .filter(|msg| msg.is_streaming())
                .count();
            max_streaming = max_streaming.max(streaming);
        }
        max_streaming
    });

    for prompt in ["one", "two", "three"] {
        orchestrator.send(prompt);
        orchestrator.send("dropped while in flight");
        settle(&orchestrator).await;
    }
    orchestrator.send("four");
    orchestrator.cancel();
    let conversation = settle(&orchestrator).await;
    assert_eq!(conversation.messages().len(), 8);

    // Dropping the only handle stops the actor and closes the channel.
    drop(orchestrator);
    let max_streaming = timeout(Duration::from_secs(60), monitor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(max_streaming, 1);
}

#[tokio::test(start_paused = true)]
async fn test_on_idle() {
    let service = TestModelService::with_script([
        PresetResponse::answer("Hi."),
        PresetResponse::failure("boom"),
    ]);
    let idle_count = Arc::new(AtomicUsize::new(0));
    let (idle_tx, mut idle_rx) = watch::channel(0usize);

    let orchestrator = OrchestratorBuilder::with_model_service(service)
        .with_config(
            ChatConfig::builder()
                .with_pacing(crate::RevealPacing::INSTANT)
                .build(),
        )
        .on_idle({
            let idle_count = Arc::clone(&idle_count);
            move || {
                let count = idle_count.fetch_add(1, Ordering::Relaxed) + 1;
                idle_tx.send(count).unwrap();
            }
        })
        .build();
    wait_for(&orchestrator, Conversation::is_model_ready).await;

    orchestrator.send("Hello");
    timeout(Duration::from_millis(500), idle_rx.wait_for(|v| *v == 1))
        .await
        .unwrap()
        .unwrap();

    orchestrator.send("Hello again");
    timeout(Duration::from_millis(500), idle_rx.wait_for(|v| *v == 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(idle_count.load(Ordering::Relaxed), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown() {
    let service =
        TestModelService::with_script([PresetResponse::answer("Never seen.")])
            .with_respond_delay(Duration::from_secs(10));
    let orchestrator = build_ready(service).await;

    orchestrator.send("hello");
    let conversation = orchestrator.snapshot().await;
    assert!(conversation.is_loading());

    orchestrator.shutdown();
    // The last published snapshot is still readable after stopping.
    let conversation = orchestrator.snapshot().await;
    assert_eq!(conversation.messages().len(), 2);
    orchestrator.send("ignored");
    assert_eq!(orchestrator.current().messages().len(), 2);
}
