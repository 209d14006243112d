//! S3 Backend Integration Tests
//!
//! Runs [`ObjectClient`] over the `aws-sdk-s3` backed store against a
//! wiremock server speaking the S3 REST protocol (path-style addressing).
//!
//! ## Test Coverage
//!
//! - Request routing for put / get / list / multipart
//! - Service error codes classified into error kinds
//! - Offline presigning

#[cfg(test)]
mod tests {
    use s3_adaptor::backend::CompletedPart;
    use s3_adaptor::binder::Options;
    use s3_adaptor::config::{AuthConfig, Config};
    use s3_adaptor::error::ErrorKind;
    use s3_adaptor::{ObjectClient, TransferBody};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: &str) -> Config {
        let mut config = Config::default();
        config.client.region = "us-east-1".to_string();
        config.client.endpoint = Some(endpoint.to_string());
        config.client.force_path_style = true;
        config.client.auth = Some(AuthConfig::Static {
            access_key_id: "test-access".to_string(),
            secret_access_key: "test-secret".to_string(),
            session_token: None,
        });
        config
    }

    async fn client_for(mock_server: &MockServer) -> ObjectClient {
        ObjectClient::from_config(&test_config(&mock_server.uri()))
            .await
            .unwrap()
    }

    fn s3_error(status: u16, code: &str, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_string(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error>
                <Code>{}</Code>
                <Message>{}</Message>
                <RequestId>test-request</RequestId>
            </Error>"#,
            code, message
        ))
    }

    // ========================================================================
    // TEST: Objects
    // ========================================================================

    #[tokio::test]
    async fn test_put_object_sends_content_type() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/test-bucket/notes.txt"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let options = Options::new().with("contentType", "text/plain");
        client
            .put_object("test-bucket", "notes.txt", TransferBody::from("hello"), &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_object_streams_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test-bucket/data.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"etag-1\"")
                    .insert_header("Content-Type", "application/octet-stream")
                    .set_body_bytes(vec![b'z'; 10_000]),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let mut reader = client
            .get_object("test-bucket", "data.bin", &Options::new())
            .await
            .unwrap();
        assert_eq!(reader.metadata().etag.as_deref(), Some("\"etag-1\""));
        assert_eq!(reader.metadata().storage_class, "STANDARD");

        let mut total = 0;
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            assert!(chunk.len() <= client.settings().download_chunk_size);
            total += chunk.len();
        }
        assert_eq!(total, 10_000);
    }

    #[tokio::test]
    async fn test_get_missing_key_is_object_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test-bucket/missing.txt"))
            .respond_with(s3_error(404, "NoSuchKey", "The specified key does not exist."))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let err = client
            .get_object("test-bucket", "missing.txt", &Options::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
        assert_eq!(err.code(), Some("NoSuchKey"));
        assert_eq!(err.message(), "The specified key does not exist.");
    }

    #[tokio::test]
    async fn test_head_not_found_means_not_exists() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/test-bucket/ghost.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        assert!(!client.object_exists("test-bucket", "ghost.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_ok() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/test-bucket/gone.txt"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        client
            .delete_object("test-bucket", "gone.txt", &Options::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_access_denied_is_generic() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/private/secret.txt"))
            .respond_with(s3_error(403, "AccessDenied", "Access Denied"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let err = client
            .get_object("private", "secret.txt", &Options::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert_eq!(err.code(), Some("AccessDenied"));
        assert_eq!(err.to_string(), "aws.s3:Error: Access Denied");
    }

    #[tokio::test]
    async fn test_copy_object_encodes_source_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/dst-bucket/copy.txt"))
            .and(header(
                "x-amz-copy-source",
                "src-bucket/reports/q1%20final%2B%C3%A9.csv",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <CopyObjectResult>
                    <ETag>"copied"</ETag>
                    <LastModified>2024-03-01T12:00:00.000Z</LastModified>
                </CopyObjectResult>"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        client
            .copy_object(
                "src-bucket",
                "reports/q1 final+\u{e9}.csv",
                "dst-bucket",
                "copy.txt",
                &Options::new(),
            )
            .await
            .unwrap();
    }

    // ========================================================================
    // TEST: Buckets and listing
    // ========================================================================

    #[tokio::test]
    async fn test_delete_non_empty_bucket() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/full-bucket"))
            .respond_with(s3_error(
                409,
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            ))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let err = client.delete_bucket("full-bucket").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BucketNotEmpty);
    }

    #[tokio::test]
    async fn test_list_objects_parses_page() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test-bucket"))
            .and(query_param("list-type", "2"))
            .and(query_param("max-keys", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                    <Name>test-bucket</Name>
                    <Prefix></Prefix>
                    <KeyCount>2</KeyCount>
                    <MaxKeys>2</MaxKeys>
                    <IsTruncated>true</IsTruncated>
                    <NextContinuationToken>token-2</NextContinuationToken>
                    <Contents>
                        <Key>a.txt</Key>
                        <LastModified>2024-03-01T12:00:00.000Z</LastModified>
                        <ETag>"e1"</ETag>
                        <Size>10</Size>
                        <StorageClass>STANDARD</StorageClass>
                    </Contents>
                    <Contents>
                        <Key>b.txt</Key>
                        <LastModified>2024-03-02T12:00:00.000Z</LastModified>
                        <ETag>"e2"</ETag>
                        <Size>20</Size>
                        <StorageClass>STANDARD</StorageClass>
                    </Contents>
                </ListBucketResult>"#,
            ))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let listing = client
            .list_objects("test-bucket", &Options::new().with("maxKeys", 2))
            .await
            .unwrap();

        assert_eq!(listing.count, 2);
        assert!(listing.is_truncated);
        assert_eq!(listing.next_continuation_token.as_deref(), Some("token-2"));
        assert_eq!(listing.objects[1].key, "b.txt");
        assert_eq!(listing.objects[1].size, 20);
    }

    // ========================================================================
    // TEST: Multipart
    // ========================================================================

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/test-bucket/big.bin"))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <InitiateMultipartUploadResult>
                    <Bucket>test-bucket</Bucket>
                    <Key>big.bin</Key>
                    <UploadId>upload-123</UploadId>
                </InitiateMultipartUploadResult>"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/test-bucket/big.bin"))
            .and(query_param("uploadId", "upload-123"))
            .and(query_param("partNumber", "1"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"part-1\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/test-bucket/big.bin"))
            .and(query_param("uploadId", "upload-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <CompleteMultipartUploadResult>
                    <Bucket>test-bucket</Bucket>
                    <Key>big.bin</Key>
                    <ETag>"final-1"</ETag>
                </CompleteMultipartUploadResult>"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let upload_id = client
            .initiate_multipart("test-bucket", "big.bin", &Options::new())
            .await
            .unwrap();
        assert_eq!(upload_id, "upload-123");

        let etag = client
            .upload_part(
                "test-bucket",
                "big.bin",
                &upload_id,
                1,
                TransferBody::from("part data"),
                &Options::new(),
            )
            .await
            .unwrap();
        assert_eq!(etag, "\"part-1\"");

        client
            .complete_multipart(
                "test-bucket",
                "big.bin",
                &upload_id,
                vec![CompletedPart::new(1, etag)],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_abort_unknown_upload_is_ok() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/test-bucket/big.bin"))
            .and(query_param("uploadId", "missing"))
            .respond_with(s3_error(
                404,
                "NoSuchUpload",
                "The specified upload does not exist.",
            ))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        client
            .abort_multipart("test-bucket", "big.bin", "missing")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_abort_surfaces_other_faults() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/test-bucket/big.bin"))
            .and(query_param("uploadId", "locked"))
            .respond_with(s3_error(403, "AccessDenied", "Access Denied"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server).await;
        let err = client
            .abort_multipart("test-bucket", "big.bin", "locked")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    // ========================================================================
    // TEST: Presign
    // ========================================================================

    #[tokio::test]
    async fn test_presign_is_offline_and_signed() {
        let client = ObjectClient::from_config(&test_config("http://localhost:9000"))
            .await
            .unwrap();

        let url = client
            .presign("test-bucket", "report.pdf", "GET", Some(10))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:9000/test-bucket/report.pdf?"));
        assert!(url.contains("X-Amz-Expires=600"));
        assert!(url.contains("X-Amz-Signature="));

        let url = client
            .presign("test-bucket", "upload.bin", "PUT", None)
            .await
            .unwrap();
        assert!(url.contains("X-Amz-Expires=900"));
    }
}
