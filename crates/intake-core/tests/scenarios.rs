//! End-to-end flows through the intake service

use chrono::{Duration, Utc};
use intake_core::{
    ApplicationStatus, ApplicationStore, ConsentSet, CoverOption, DispatchReport,
    FinalizeOutcome, IntakeError, NotifyOutcome, NotifyRequest,
};
use intake_test_utils::{
    banking_details, cover_selection, eligibility, object, personal_details, setup_service,
    setup_service_with, test_config, FailingNotifier, TEST_RECIPIENT,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn happy_path_dispatches_exactly_one_confirmation() {
    let (harness, notifier) = setup_service();
    let service = &harness.service;

    let created = service.create(eligibility()).await.unwrap();
    let token = created.token.as_str();

    let record = service.update(token, 2, &personal_details()).await.unwrap();
    assert_eq!(record.first_name.as_deref(), Some("Jane"));
    service.update(token, 3, &cover_selection()).await.unwrap();
    let record = service.update(token, 4, &banking_details()).await.unwrap();
    assert_eq!(record.cover_option, Some(CoverOption::OptionB));
    assert_eq!(record.current_step, 4);

    let finalized = service
        .finalize(token, ConsentSet::all_granted())
        .await
        .unwrap();
    let FinalizeOutcome::Completed(record) = finalized else {
        panic!("first finalize must complete the record");
    };
    assert_eq!(record.status, ApplicationStatus::Complete);
    assert_eq!(record.current_step, 5);
    assert!(record.consent_timestamp.is_some());

    let request = NotifyRequest {
        application_id: created.application_id,
        session_marker: created.session_marker.clone(),
        event_correlation_id: Some("evt-123".to_string()),
    };
    let first = service.notify(&request).await.unwrap();
    assert!(matches!(
        first,
        NotifyOutcome::Dispatched(DispatchReport::Delivered { .. })
    ));
    let second = service.notify(&request).await.unwrap();
    assert_eq!(second, NotifyOutcome::AlreadyNotified);

    assert_eq!(notifier.send_count(), 1);
    let sent = notifier.sent();
    assert_eq!(sent[0].to, vec![TEST_RECIPIENT.to_string()]);
    assert_eq!(
        sent[0].subject,
        format!(
            "New Application Received - Jane Doe - Ref: {}",
            created.application_id.reference()
        )
    );
    assert_eq!(
        sent[0].attachments[0].filename,
        format!("Application-{}.txt", created.application_id.reference())
    );

    let stored = harness.store.get(created.application_id).await.unwrap();
    assert!(stored.abandonment_email_sent);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let (harness, _) = setup_service();
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();

    let record = harness.store.get(created.application_id).await.unwrap();
    let codec = service.gate().codec();
    let mut claims = codec.claims_for(
        record.id,
        record.session_marker.clone(),
        None,
        Utc::now() - Duration::hours(25),
    );
    claims.exp = Utc::now().timestamp() - 1;
    let expired = codec.issue(&claims);

    assert_eq!(
        service.update(&expired, 2, &personal_details()).await,
        Err(IntakeError::Unauthorized)
    );
    assert_eq!(
        service.finalize(&expired, ConsentSet::all_granted()).await,
        Err(IntakeError::Unauthorized)
    );
    assert_eq!(harness.store.get(record.id).await.unwrap(), record);
}

#[tokio::test]
async fn token_cannot_reach_another_application() {
    let (harness, _) = setup_service();
    let service = &harness.service;
    let a = service.create(eligibility()).await.unwrap();
    let b = service.create(eligibility()).await.unwrap();
    let b_before = harness.store.get(b.application_id).await.unwrap();

    // Payload names B; the token binds A.
    let forged = object(json!({
        "id": b.application_id.to_string(),
        "applicant_id": b.application_id.to_string(),
        "first_name": "Mallory"
    }));
    let updated = service.update(&a.token, 2, &forged).await.unwrap();

    assert_eq!(updated.id, a.application_id);
    assert_eq!(updated.first_name.as_deref(), Some("Mallory"));
    assert_eq!(harness.store.get(b.application_id).await.unwrap(), b_before);

    service
        .finalize(&a.token, ConsentSet::all_granted())
        .await
        .unwrap();
    assert_eq!(harness.store.get(b.application_id).await.unwrap(), b_before);
}

#[tokio::test]
async fn non_whitelisted_keys_are_silently_dropped() {
    let (harness, _) = setup_service();
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();

    let payload = object(json!({
        "account_number": "123",
        "admin_override": true,
        "status": "complete",
        "abandonment_email_sent": true
    }));
    service.update(&created.token, 4, &payload).await.unwrap();

    let record = harness.store.get(created.application_id).await.unwrap();
    assert_eq!(record.account_number.as_deref(), Some("123"));
    assert_eq!(record.status, ApplicationStatus::Partial);
    assert!(!record.abandonment_email_sent);
    let as_json = serde_json::to_value(&record).unwrap();
    assert!(as_json.get("admin_override").is_none());
}

#[tokio::test]
async fn update_rejections_write_nothing() {
    let (harness, _) = setup_service();
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();
    let before = harness.store.get(created.application_id).await.unwrap();

    assert_eq!(
        service
            .update(&created.token, 2, &object(json!({ "nickname": "JD" })))
            .await,
        Err(IntakeError::NoValidFields)
    );
    assert!(matches!(
        service
            .update(
                &created.token,
                3,
                &object(json!({ "first_name": "Jane", "cover_option": "gold" }))
            )
            .await,
        Err(IntakeError::InvalidFieldValue { field: "cover_option", .. })
    ));
    assert_eq!(
        service.update(&created.token, 5, &personal_details()).await,
        Err(IntakeError::InvalidStepNumber(5))
    );
    assert_eq!(harness.store.get(created.application_id).await.unwrap(), before);
}

#[tokio::test]
async fn complete_is_terminal() {
    let (harness, _) = setup_service();
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();
    service.update(&created.token, 2, &personal_details()).await.unwrap();

    let first = service
        .finalize(&created.token, ConsentSet::all_granted())
        .await
        .unwrap()
        .into_record();
    let again = service
        .finalize(&created.token, ConsentSet::all_granted())
        .await
        .unwrap();
    assert_eq!(again, FinalizeOutcome::AlreadyComplete(first.clone()));

    assert_eq!(
        service.update(&created.token, 2, &personal_details()).await,
        Err(IntakeError::AlreadyComplete)
    );
    assert_eq!(harness.store.get(created.application_id).await.unwrap(), first);
}

#[tokio::test]
async fn notify_requires_marker_and_completion() {
    let (harness, notifier) = setup_service();
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();

    let mut request = NotifyRequest {
        application_id: created.application_id,
        session_marker: created.session_marker.clone(),
        event_correlation_id: None,
    };
    assert_eq!(service.notify(&request).await, Err(IntakeError::Forbidden));

    service
        .finalize(&created.token, ConsentSet::all_granted())
        .await
        .unwrap();
    request.session_marker = "not-the-marker".to_string();
    assert_eq!(service.notify(&request).await, Err(IntakeError::Forbidden));

    request.session_marker = String::new();
    assert_eq!(service.notify(&request).await, Err(IntakeError::Unauthorized));

    assert_eq!(notifier.send_count(), 0);
    let record = harness.store.get(created.application_id).await.unwrap();
    assert!(!record.abandonment_email_sent);
}

#[tokio::test]
async fn failed_delivery_is_not_retried() {
    let notifier = Arc::new(FailingNotifier::new());
    let harness = setup_service_with(&test_config(), Some(notifier.clone()));
    let service = &harness.service;
    let created = service.create(eligibility()).await.unwrap();
    service
        .finalize(&created.token, ConsentSet::all_granted())
        .await
        .unwrap();

    let request = NotifyRequest {
        application_id: created.application_id,
        session_marker: created.session_marker.clone(),
        event_correlation_id: None,
    };
    assert!(matches!(
        service.notify(&request).await.unwrap(),
        NotifyOutcome::Dispatched(DispatchReport::DeliveryFailed(_))
    ));
    assert_eq!(
        service.notify(&request).await.unwrap(),
        NotifyOutcome::AlreadyNotified
    );
    assert_eq!(notifier.send_count(), 1);
}
