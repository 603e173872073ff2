//! Device binding and quota enforcement, exercised at the query layer.

mod common;
use common::*;

use streamgate::error::AppError;

#[test]
fn test_quota_follows_active_subscription() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn);

    // No subscription: a single implicit binding
    assert_eq!(queries::device_quota(&conn, &user.id).unwrap(), 1);

    create_test_subscription(&conn, &user.id, Plan::Monthly);
    assert_eq!(queries::device_quota(&conn, &user.id).unwrap(), 3);

    for i in 0..3 {
        queries::bind_device(&mut conn, &user.id, &format!("device-{}", i), None)
            .expect("binding under quota should succeed");
    }
    assert_eq!(queries::count_devices(&conn, &user.id).unwrap(), 3);

    let err = queries::bind_device(&mut conn, &user.id, "device-3", None)
        .expect_err("fourth device must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(queries::count_devices(&conn, &user.id).unwrap(), 3);
}

#[test]
fn test_unsubscribed_user_gets_one_device() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn);

    queries::bind_device(&mut conn, &user.id, "only-device", None).unwrap();

    let err = queries::bind_device(&mut conn, &user.id, "second-device", None)
        .expect_err("second device without a subscription must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[test]
fn test_rebinding_own_device_is_a_heartbeat() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn);

    let first = queries::bind_device(&mut conn, &user.id, "phone-1", Some("app/1.0")).unwrap();
    let second = queries::bind_device(&mut conn, &user.id, "phone-1", None).unwrap();

    assert_eq!(first.id, second.id, "heartbeat must not create a new row");
    assert!(second.last_seen_at >= first.last_seen_at);
    // A missing user agent on the heartbeat keeps the recorded one
    assert_eq!(second.user_agent.as_deref(), Some("app/1.0"));
    assert_eq!(queries::count_devices(&conn, &user.id).unwrap(), 1);
}

#[test]
fn test_expired_subscription_does_not_count_for_quota() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn);

    // An expired subscription row must not raise the quota
    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan, duration_days, max_devices, status, created_at, expires_at)
         VALUES ('sub-old', ?1, 'monthly', 30, 3, 'active', ?2, ?3)",
        rusqlite::params![&user.id, past_timestamp(40), past_timestamp(10)],
    )
    .unwrap();

    assert_eq!(queries::device_quota(&conn, &user.id).unwrap(), 1);

    queries::bind_device(&mut conn, &user.id, "device-0", None).unwrap();
    let err = queries::bind_device(&mut conn, &user.id, "device-1", None)
        .expect_err("expired subscription must not extend the quota");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[test]
fn test_device_adoption_moves_ownership() {
    let mut conn = setup_test_db();
    let old_owner = create_test_user(&conn);
    queries::bind_device(&mut conn, &old_owner.id, "shared-tv", None).unwrap();

    let new_owner = create_test_user(&conn);
    create_test_subscription(&conn, &new_owner.id, Plan::Monthly);

    let device = queries::bind_device(&mut conn, &new_owner.id, "shared-tv", None).unwrap();
    assert_eq!(device.user_id, new_owner.id);

    assert_eq!(queries::count_devices(&conn, &old_owner.id).unwrap(), 0);
    assert_eq!(queries::count_devices(&conn, &new_owner.id).unwrap(), 1);

    let owner = queries::get_user_by_device(&conn, "shared-tv").unwrap().unwrap();
    assert_eq!(owner.id, new_owner.id);
}

#[test]
fn test_adoption_respects_new_owners_quota() {
    let mut conn = setup_test_db();
    let old_owner = create_test_user(&conn);
    queries::bind_device(&mut conn, &old_owner.id, "shared-tv", None).unwrap();

    // New owner is already at their single-device limit
    let new_owner = create_test_user(&conn);
    queries::bind_device(&mut conn, &new_owner.id, "phone-1", None).unwrap();

    let err = queries::bind_device(&mut conn, &new_owner.id, "shared-tv", None)
        .expect_err("adoption over quota must be rejected");
    assert!(matches!(err, AppError::Conflict(_)));

    // The device stays with its original owner
    let owner = queries::get_user_by_device(&conn, "shared-tv").unwrap().unwrap();
    assert_eq!(owner.id, old_owner.id);
}

#[test]
fn test_every_pooled_connection_enforces_foreign_keys() {
    let path = std::env::temp_dir().join(format!("streamgate-test-{}.db", uuid::Uuid::new_v4()));
    let path_str = path.to_str().unwrap().to_string();

    {
        let pool = streamgate::db::create_pool(&path_str).unwrap();
        {
            let conn = pool.get().unwrap();
            init_db(&conn).unwrap();
        }

        // A fresh connection from the pool, not the one that ran the schema
        let conn = pool.get().unwrap();
        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);

        let orphan = conn.execute(
            "INSERT INTO devices (id, user_id, device_id, created_at, last_seen_at)
             VALUES ('d1', 'no-such-user', 'dev-1', 0, 0)",
            [],
        );
        assert!(orphan.is_err(), "device row without a user must be rejected");
    }

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{}-wal", path_str));
    let _ = std::fs::remove_file(format!("{}-shm", path_str));
}

#[test]
fn test_list_devices_orders_by_creation() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn);
    create_test_subscription(&conn, &user.id, Plan::Yearly);

    for i in 0..3 {
        queries::bind_device(&mut conn, &user.id, &format!("device-{}", i), None).unwrap();
    }

    let devices = queries::list_devices(&conn, &user.id).unwrap();
    assert_eq!(devices.len(), 3);
    assert_eq!(devices[0].device_id, "device-0");
    assert_eq!(devices[2].device_id, "device-2");
}
