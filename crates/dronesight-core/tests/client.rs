//! Face API client against a local canned-response HTTP server.

use dronesight_core::{
    status_line, Analysis, ClientConfig, FaceApiError, FaceClient, FacePipeline, FaceService,
    IdentifyOptions,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

const KEY: &str = "test-subscription-key";
const FACE_ID: &str = "c5c24a82-6845-4031-9d5d-978df9175426";
const PERSON_ID: &str = "25985303-c537-4467-b41d-bdb45cd95ca1";

#[derive(Debug)]
struct Recorded {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap().split(' ');
    let method = request_line.next().unwrap().to_string();
    let target = request_line.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse::<usize>().unwrap())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        method,
        target,
        headers,
        body,
    }
}

/// Serve one canned response per connection, in order.
async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let reply = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            seen.push(request);
        }
        seen
    });
    (format!("http://{addr}"), handle)
}

fn client(endpoint: &str) -> FaceClient {
    FaceClient::new(ClientConfig {
        endpoint: endpoint.to_string(),
        subscription_key: KEY.to_string(),
        return_landmarks: true,
    })
    .unwrap()
}

fn detect_body() -> String {
    format!(
        r#"[{{"faceId":"{FACE_ID}","faceRectangle":{{"top":54,"left":394,"width":78,"height":78}}}}]"#
    )
}

fn identify_body(confidence: f32) -> String {
    format!(
        r#"[{{"faceId":"{FACE_ID}","candidates":[{{"personId":"{PERSON_ID}","confidence":{confidence}}}]}}]"#
    )
}

fn person_body(name: &str) -> String {
    format!(r#"{{"personId":"{PERSON_ID}","name":"{name}","userData":null,"persistedFaceIds":[]}}"#)
}

#[tokio::test]
async fn detect_posts_jpeg_with_key_and_flags() {
    let (endpoint, server) = serve(vec![(200, detect_body())]).await;
    let faces = client(&endpoint).detect(vec![0xFF, 0xD8, 0xFF]).await.unwrap();

    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].face_id, Uuid::parse_str(FACE_ID).unwrap());

    let seen = server.await.unwrap();
    let req = &seen[0];
    assert_eq!(req.method, "POST");
    assert!(req.target.starts_with("/face/v1.0/detect?"));
    assert!(req.target.contains("returnFaceId=true"));
    assert!(req.target.contains("returnFaceLandmarks=true"));
    assert_eq!(req.header("Ocp-Apim-Subscription-Key"), Some(KEY));
    assert_eq!(req.header("Content-Type"), Some("application/octet-stream"));
    assert_eq!(req.body, vec![0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn identify_posts_group_and_first_face() {
    let (endpoint, server) = serve(vec![(200, identify_body(0.92))]).await;
    let face_id = Uuid::parse_str(FACE_ID).unwrap();
    let mut options = IdentifyOptions::new("drone-crew");
    options.confidence_threshold = 0.6;

    let results = client(&endpoint).identify(&[face_id], &options).await.unwrap();
    assert_eq!(results[0].candidates[0].person_id, Uuid::parse_str(PERSON_ID).unwrap());

    let seen = server.await.unwrap();
    let req = &seen[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.target, "/face/v1.0/identify");
    assert!(req.header("Content-Type").unwrap().starts_with("application/json"));
    let body = req.json();
    assert_eq!(body["personGroupId"], "drone-crew");
    assert_eq!(body["faceIds"], serde_json::json!([FACE_ID]));
    assert_eq!(body["maxNumOfCandidatesReturned"], 1);
    assert!((body["confidenceThreshold"].as_f64().unwrap() - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn person_lookup_uses_group_path() {
    let (endpoint, server) = serve(vec![(200, person_body("Ann"))]).await;
    let person = client(&endpoint)
        .person("drone-crew", Uuid::parse_str(PERSON_ID).unwrap())
        .await
        .unwrap();
    assert_eq!(person.name, "Ann");

    let seen = server.await.unwrap();
    assert_eq!(seen[0].method, "GET");
    assert_eq!(
        seen[0].target,
        format!("/face/v1.0/persongroups/drone-crew/persons/{PERSON_ID}")
    );
    assert_eq!(seen[0].header("Ocp-Apim-Subscription-Key"), Some(KEY));
}

#[tokio::test]
async fn service_error_body_is_typed() {
    let body = r#"{"error":{"code":"Unspecified","message":"Access denied due to invalid subscription key."}}"#;
    let (endpoint, server) = serve(vec![(401, body.to_string())]).await;

    let err = client(&endpoint).detect(vec![1]).await.unwrap_err();
    match err {
        FaceApiError::Service { status, code, message } => {
            assert_eq!(status, 401);
            assert_eq!(code, "Unspecified");
            assert!(message.contains("invalid subscription key"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let (endpoint, server) = serve(vec![(200, "not json".to_string())]).await;
    let err = client(&endpoint).detect(vec![1]).await.unwrap_err();
    assert!(matches!(err, FaceApiError::Decode(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn create_group_accepts_conflict() {
    let conflict = r#"{"error":{"code":"PersonGroupExists","message":"Person group already exists."}}"#;
    let (endpoint, server) = serve(vec![(200, String::new()), (409, conflict.to_string())]).await;
    let c = client(&endpoint);

    c.create_person_group("drone-crew", "Drone crew", Some("hangar 2"))
        .await
        .unwrap();
    c.create_person_group("drone-crew", "Drone crew", None)
        .await
        .unwrap();

    let seen = server.await.unwrap();
    assert_eq!(seen[0].method, "PUT");
    assert_eq!(seen[0].target, "/face/v1.0/persongroups/drone-crew");
    assert_eq!(
        seen[0].json(),
        serde_json::json!({ "name": "Drone crew", "userData": "hangar 2" })
    );
    assert_eq!(seen[1].json(), serde_json::json!({ "name": "Drone crew" }));
}

#[tokio::test]
async fn enrollment_round() {
    let persisted = "43897a75-8d6f-42cf-885e-74832febb055";
    let (endpoint, server) = serve(vec![
        (200, format!(r#"{{"personId":"{PERSON_ID}"}}"#)),
        (200, format!(r#"{{"persistedFaceId":"{persisted}"}}"#)),
        (202, String::new()),
        (
            200,
            r#"{"status":"running","createdDateTime":"2017-03-06T20:29:35.5966286Z"}"#.to_string(),
        ),
    ])
    .await;
    let c = client(&endpoint);

    let person_id = c.create_person("drone-crew", "Ann", None).await.unwrap();
    assert_eq!(person_id, Uuid::parse_str(PERSON_ID).unwrap());
    let face = c
        .add_person_face("drone-crew", person_id, vec![0xFF, 0xD8])
        .await
        .unwrap();
    assert_eq!(face, Uuid::parse_str(persisted).unwrap());
    c.train("drone-crew").await.unwrap();
    let status = c.training_status("drone-crew").await.unwrap();
    assert_eq!(status.status, dronesight_core::types::TrainingState::Running);

    let seen = server.await.unwrap();
    assert_eq!(seen[0].target, "/face/v1.0/persongroups/drone-crew/persons");
    assert_eq!(
        seen[1].target,
        format!("/face/v1.0/persongroups/drone-crew/persons/{PERSON_ID}/persistedFaces")
    );
    assert_eq!(seen[1].header("Content-Type"), Some("application/octet-stream"));
    assert_eq!(seen[2].method, "POST");
    assert_eq!(seen[2].target, "/face/v1.0/persongroups/drone-crew/train");
    assert_eq!(seen[3].method, "GET");
    assert_eq!(seen[3].target, "/face/v1.0/persongroups/drone-crew/training");
}

#[tokio::test]
async fn invalid_group_id_makes_no_request() {
    let c = client("http://127.0.0.1:9");
    let err = c.train("Not Valid").await.unwrap_err();
    assert!(matches!(err, FaceApiError::Config(_)));
}

#[tokio::test]
async fn pipeline_full_chain_over_http() {
    let (endpoint, server) = serve(vec![
        (200, detect_body()),
        (200, identify_body(0.92)),
        (200, person_body("Bea")),
    ])
    .await;
    let pipeline = FacePipeline::new(Arc::new(client(&endpoint)), IdentifyOptions::new("drone-crew"));

    let analysis = pipeline.run(vec![0xFF, 0xD8]).await;
    assert!(analysis.is_identified());
    assert_eq!(status_line(&analysis), "Face Detected: Bea (92%)");

    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn pipeline_empty_detect_makes_one_request() {
    let (endpoint, server) = serve(vec![(200, "[]".to_string())]).await;
    let pipeline = FacePipeline::new(Arc::new(client(&endpoint)), IdentifyOptions::new("drone-crew"));

    let analysis = pipeline.run(vec![0xFF, 0xD8]).await;
    assert!(matches!(analysis, Analysis::NoFaceDetected { cause: None }));
    assert_eq!(server.await.unwrap().len(), 1);
}
